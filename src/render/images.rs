//! Image loading, decoding, and per-worker caching.
//!
//! All IO lives here; painters consume prepared premultiplied RGBA8 only.
//! A failed load or decode never fails the row; the painter draws a marked
//! placeholder in the image's box instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine as _;

use crate::foundation::error::{PinError, PinResult};

/// Decoded raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

pub fn decode_image(bytes: &[u8]) -> PinResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Per-worker image cache keyed by resolved source string.
///
/// Successes and failures are both memoized, so a broken URL is fetched once
/// per worker, not once per row.
pub struct ImageCache {
    root: Option<PathBuf>,
    client: Option<reqwest::blocking::Client>,
    cache: HashMap<String, Option<PreparedImage>>,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCache {
    pub fn new() -> Self {
        Self {
            root: None,
            client: None,
            cache: HashMap::new(),
        }
    }

    /// Root directory for relative file sources.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Enable http(s) sources.
    pub fn with_http(mut self) -> PinResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("pinpress/0.1")
            .build()
            .map_err(|e| PinError::element(format!("image HTTP client error: {e}")))?;
        self.client = Some(client);
        Ok(self)
    }

    /// Pre-seed a source, mainly for tests.
    pub fn insert(&mut self, source: impl Into<String>, image: PreparedImage) {
        self.cache.insert(source.into(), Some(image));
    }

    /// Fetch + decode a source, memoized. `None` means "paint a placeholder".
    pub fn get(&mut self, source: &str) -> Option<PreparedImage> {
        if let Some(cached) = self.cache.get(source) {
            return cached.clone();
        }

        let loaded = match self.load_uncached(source) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::warn!(source, error = %e, "image load failed, using placeholder");
                None
            }
        };
        self.cache.insert(source.to_owned(), loaded.clone());
        loaded
    }

    fn load_uncached(&self, source: &str) -> PinResult<PreparedImage> {
        let bytes = self.fetch_bytes(source)?;
        decode_image(&bytes)
    }

    fn fetch_bytes(&self, source: &str) -> PinResult<Vec<u8>> {
        if let Some(rest) = source.strip_prefix("data:") {
            let payload = rest
                .split_once("base64,")
                .map(|(_, p)| p)
                .ok_or_else(|| PinError::element("data URI without base64 payload"))?;
            return base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| PinError::element(format!("decode data URI: {e}")));
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| PinError::element("remote image sources are disabled"))?;
            let resp = client
                .get(source)
                .send()
                .map_err(|e| PinError::element(format!("fetch image '{source}': {e}")))?;
            if !resp.status().is_success() {
                return Err(PinError::element(format!(
                    "fetch image '{source}': status {}",
                    resp.status()
                )));
            }
            return resp
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| PinError::element(format!("read image body '{source}': {e}")));
        }

        let path = source.strip_prefix("file://").unwrap_or(source);
        let path = match (&self.root, std::path::Path::new(path).is_relative()) {
            (Some(root), true) => root.join(path),
            _ => PathBuf::from(path),
        };
        std::fs::read(&path)
            .map_err(|e| PinError::element(format!("read image '{}': {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(r: u8, g: u8, b: u8, a: u8) -> Vec<u8> {
        let img = image::RgbaImage::from_raw(1, 1, vec![r, g, b, a]).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_image_png_dimensions_and_premul() {
        let prepared = decode_image(&png_bytes(100, 50, 200, 128)).unwrap();
        assert_eq!(prepared.width, 1);
        assert_eq!(prepared.height, 1);
        assert_eq!(
            prepared.rgba8_premul.as_slice(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn data_uri_round_trips_through_cache() {
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png_bytes(255, 0, 0, 255))
        );
        let mut cache = ImageCache::new();
        let img = cache.get(&uri).expect("data URI decodes");
        assert_eq!((img.width, img.height), (1, 1));
    }

    #[test]
    fn failed_source_is_negative_cached() {
        let mut cache = ImageCache::new();
        assert!(cache.get("/definitely/not/here.png").is_none());
        // Second hit answers from the cache (still a placeholder).
        assert!(cache.get("/definitely/not/here.png").is_none());
    }

    #[test]
    fn bad_bytes_fail_decode() {
        assert!(decode_image(b"not an image").is_err());
    }
}
