//! Font resolution for the headless render environment.
//!
//! The headless worker runs with a restricted font set: an unavailable
//! family degrades to the closest generic class by name heuristic, after
//! first trying to fetch the exact family from a bundled directory or a
//! remote repository. Resolution is cached per registry, and each worker
//! owns its own registry instance; there is no ambient global font state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::foundation::error::{PinError, PinResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GenericFamily {
    SansSerif,
    Serif,
    Monospace,
    Cursive,
}

/// Heuristic mapping of a family name to its generic class.
pub fn classify_family(name: &str) -> GenericFamily {
    let n = name.to_lowercase();

    if ["mono", "code", "consol", "courier", "menlo"]
        .iter()
        .any(|k| n.contains(k))
    {
        return GenericFamily::Monospace;
    }
    if ["script", "cursive", "hand", "brush", "comic", "pacifico"]
        .iter()
        .any(|k| n.contains(k))
    {
        return GenericFamily::Cursive;
    }
    if n.contains("serif") && !n.contains("sans") {
        return GenericFamily::Serif;
    }
    if ["times", "georgia", "garamond", "playfair", "merriweather", "baskerville"]
        .iter()
        .any(|k| n.contains(k))
    {
        return GenericFamily::Serif;
    }
    GenericFamily::SansSerif
}

fn generic_candidates(class: GenericFamily) -> &'static [&'static str] {
    match class {
        GenericFamily::SansSerif => &["DejaVu Sans", "Liberation Sans", "Arial", "Roboto"],
        GenericFamily::Serif => &["DejaVu Serif", "Liberation Serif", "Times New Roman"],
        GenericFamily::Monospace => &["DejaVu Sans Mono", "Liberation Mono", "Courier New"],
        GenericFamily::Cursive => &["Comic Neue", "DejaVu Sans"],
    }
}

/// File-name slug for a family: lowercased, whitespace collapsed to dashes.
pub fn family_slug(family: &str) -> String {
    family
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// One place fonts can come from. `Ok(None)` means "this source does not
/// have the family"; `Err` means the source itself failed (and is treated
/// like a miss by the registry, logged).
pub trait FontSource: Send + Sync {
    fn load(&self, family: &str) -> PinResult<Option<Vec<u8>>>;
}

/// Bundled font directory: `<root>/<slug>.{ttf,otf}`.
pub struct DirFontSource {
    root: PathBuf,
}

impl DirFontSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FontSource for DirFontSource {
    fn load(&self, family: &str) -> PinResult<Option<Vec<u8>>> {
        let slug = family_slug(family);
        for ext in ["ttf", "otf"] {
            let path = self.root.join(format!("{slug}.{ext}"));
            if path.is_file() {
                let bytes = std::fs::read(&path).map_err(|e| {
                    PinError::font(format!("read bundled font '{}': {e}", path.display()))
                })?;
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

/// Remote font repository: `GET <base>/<slug>.ttf`.
pub struct HttpFontSource {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpFontSource {
    pub fn new(base: impl Into<String>) -> PinResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("pinpress/0.1")
            .build()
            .map_err(|e| PinError::font(format!("font HTTP client error: {e}")))?;
        Ok(Self {
            base: base.into(),
            client,
        })
    }
}

impl FontSource for HttpFontSource {
    fn load(&self, family: &str) -> PinResult<Option<Vec<u8>>> {
        let url = format!("{}/{}.ttf", self.base.trim_end_matches('/'), family_slug(family));
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| PinError::font(format!("fetch font '{url}': {e}")))?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let bytes = resp
            .bytes()
            .map_err(|e| PinError::font(format!("read font body '{url}': {e}")))?;
        Ok(Some(bytes.to_vec()))
    }
}

/// A concrete font chosen for a requested family.
#[derive(Clone)]
pub struct ResolvedFont {
    /// The family that actually resolved (may be a generic-class stand-in).
    pub family: String,
    pub bytes: Arc<Vec<u8>>,
}

/// Per-worker font resolution cache.
///
/// Hits and misses are both cached, so each worker probes its sources at
/// most once per family for the life of the worker.
pub struct FontRegistry {
    sources: Vec<Box<dyn FontSource>>,
    cache: HashMap<String, Option<ResolvedFont>>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cache: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: Box<dyn FontSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn push_source(&mut self, source: Box<dyn FontSource>) {
        self.sources.push(source);
    }

    /// Resolve a family to usable font bytes.
    ///
    /// Order: cached answer, exact family via the source chain, then the
    /// generic-class candidates for the family's heuristic class. A font
    /// resolution failure is never fatal to a row by itself; callers treat
    /// `Err` as an element-level failure and paint a placeholder.
    pub fn resolve(&mut self, family: &str) -> PinResult<ResolvedFont> {
        if let Some(found) = self.probe_cached(family) {
            return Ok(found);
        }

        let class = classify_family(family);
        for candidate in generic_candidates(class) {
            if let Some(found) = self.probe_cached(candidate) {
                tracing::warn!(
                    requested = family,
                    resolved = %found.family,
                    "font family unavailable, using generic-class fallback"
                );
                // Remember the substitution for the requested name too.
                self.cache
                    .insert(cache_key(family), Some(found.clone()));
                return Ok(found);
            }
        }

        Err(PinError::font(format!(
            "no font available for family '{family}' (class {class:?})"
        )))
    }

    fn probe_cached(&mut self, family: &str) -> Option<ResolvedFont> {
        let key = cache_key(family);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let loaded = self.probe_sources(family);
        self.cache.insert(key, loaded.clone());
        loaded
    }

    fn probe_sources(&self, family: &str) -> Option<ResolvedFont> {
        for source in &self.sources {
            match source.load(family) {
                Ok(Some(bytes)) => {
                    return Some(ResolvedFont {
                        family: family.to_owned(),
                        bytes: Arc::new(bytes),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(family, error = %e, "font source failed, skipping");
                }
            }
        }
        None
    }
}

fn cache_key(family: &str) -> String {
    family.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn classifies_families_by_name() {
        assert_eq!(classify_family("Fira Code"), GenericFamily::Monospace);
        assert_eq!(classify_family("Playfair Display"), GenericFamily::Serif);
        assert_eq!(classify_family("PT Serif"), GenericFamily::Serif);
        assert_eq!(classify_family("Open Sans"), GenericFamily::SansSerif);
        assert_eq!(classify_family("Dancing Script"), GenericFamily::Cursive);
        assert_eq!(classify_family("Noto Sans Serif"), GenericFamily::SansSerif);
    }

    #[test]
    fn slugs_collapse_whitespace() {
        assert_eq!(family_slug("DejaVu Sans Mono"), "dejavu-sans-mono");
    }

    struct CountingSource {
        has: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FontSource for CountingSource {
        fn load(&self, family: &str) -> PinResult<Option<Vec<u8>>> {
            self.calls.lock().unwrap().push(family.to_owned());
            if family == self.has {
                Ok(Some(vec![0u8; 4]))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn exact_family_wins_and_is_cached() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reg = FontRegistry::new().with_source(Box::new(CountingSource {
            has: "Inter",
            calls: calls.clone(),
        }));

        let a = reg.resolve("Inter").unwrap();
        let b = reg.resolve("Inter").unwrap();
        assert_eq!(a.family, "Inter");
        assert_eq!(b.family, "Inter");

        // One probe despite two resolves.
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn unavailable_family_falls_back_to_generic_class() {
        let mut reg = FontRegistry::new().with_source(Box::new(CountingSource {
            has: "DejaVu Sans",
            calls: Arc::new(Mutex::new(Vec::new())),
        }));
        let found = reg.resolve("Totally Made Up Grotesk").unwrap();
        assert_eq!(found.family, "DejaVu Sans");
    }

    #[test]
    fn resolution_failure_is_a_font_error() {
        let mut reg = FontRegistry::new();
        assert!(matches!(
            reg.resolve("Anything"),
            Err(PinError::Font(_))
        ));
    }
}
