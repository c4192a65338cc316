//! Dynamic image source resolution.
//!
//! The priority order here is a hard contract shared by both render targets;
//! changing it silently diverges preview output from batch output.

use crate::model::campaign::{DataRow, FieldMapping};
use crate::model::element::ImageProps;
use crate::resolve::fields::{lookup_field, substitute_fields};

/// A row value only wins over the static source when it plausibly points at
/// an image: an http(s)/file URL or a `data:` URI.
pub fn looks_like_image_source(s: &str) -> bool {
    let s = s.trim();
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("file://")
        || s.starts_with("data:")
}

/// Resolve the effective image source for one row.
///
/// Priority: (1) dynamic flag + source field with a URL-looking row value,
/// (2) `{{...}}` substitution inside the static source, (3) the static
/// source verbatim.
pub fn resolve_image_url(props: &ImageProps, row: &DataRow, mapping: &FieldMapping) -> String {
    if props.dynamic
        && let Some(field) = &props.field
    {
        let value = lookup_field(field, row, mapping);
        if looks_like_image_source(value) {
            return value.trim().to_owned();
        }
    }

    if props.source.contains("{{") {
        return substitute_fields(&props.source, row, mapping);
    }

    props.source.clone()
}
