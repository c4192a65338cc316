//! `{{field}}` token substitution and text-case transforms.
//!
//! Both render targets resolve dynamic text through these functions; the
//! case transform is applied to the fully substituted string, never to the
//! raw template text.

use std::ops::Range;

use crate::model::campaign::{DataRow, FieldMapping};
use crate::model::element::CaseTransform;

/// Look up a dynamic field: the mapping points the template field at a data
/// column; when no mapping entry exists the row is consulted under the field
/// name directly; a miss resolves to the empty string.
pub fn lookup_field<'a>(name: &str, row: &'a DataRow, mapping: &FieldMapping) -> &'a str {
    if let Some(column) = mapping.get(name)
        && let Some(v) = row.get(column)
    {
        return v;
    }
    row.get(name).map(String::as_str).unwrap_or("")
}

/// Replace every `{{name}}` token, left to right, independently. Unterminated
/// braces are literal text. The token itself is never left visible: a miss
/// substitutes the empty string.
pub fn substitute_fields(raw: &str, row: &DataRow, mapping: &FieldMapping) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let name = after_open[..close].trim();
                out.push_str(lookup_field(name, row, mapping));
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Apply a case transform to an already-substituted string.
pub fn apply_case(transform: CaseTransform, s: &str) -> String {
    case_transform_with_map(transform, s).0
}

/// Case transform plus, for each input char, the byte range it produced in
/// the output. Unicode case mapping can change byte lengths (ß -> SS), so
/// style ranges defined over the logical text are remapped through this.
pub fn case_transform_with_map(transform: CaseTransform, s: &str) -> (String, Vec<Range<usize>>) {
    let mut out = String::with_capacity(s.len());
    let mut map = Vec::with_capacity(s.chars().count());
    let mut at_word_start = true;

    for ch in s.chars() {
        let start = out.len();
        match transform {
            CaseTransform::None => out.push(ch),
            CaseTransform::Uppercase => out.extend(ch.to_uppercase()),
            CaseTransform::Lowercase => out.extend(ch.to_lowercase()),
            CaseTransform::Capitalize => {
                if at_word_start && ch.is_alphabetic() {
                    out.extend(ch.to_uppercase());
                } else {
                    out.push(ch);
                }
            }
        }
        at_word_start = ch.is_whitespace();
        map.push(start..out.len());
    }

    (out, map)
}

/// Map an inclusive char range over the logical text onto a byte range of
/// the transformed output. Returns `None` for out-of-bounds ranges.
pub fn map_logical_range(
    map: &[Range<usize>],
    start_char: usize,
    end_char_inclusive: usize,
) -> Option<Range<usize>> {
    let first = map.get(start_char)?;
    let last = map.get(end_char_inclusive)?;
    Some(first.start..last.end)
}

/// Full resolution contract: substitute, then transform.
pub fn resolve_text(
    raw: &str,
    row: &DataRow,
    mapping: &FieldMapping,
    transform: CaseTransform,
) -> String {
    apply_case(transform, &substitute_fields(raw, row, mapping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn mapping(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_through_mapping_with_uppercase() {
        let out = resolve_text(
            "Hello {{name}}!",
            &row(&[("col", "World")]),
            &mapping(&[("name", "col")]),
            CaseTransform::Uppercase,
        );
        assert_eq!(out, "HELLO WORLD!");
    }

    #[test]
    fn missing_field_resolves_to_empty_not_token() {
        let out = resolve_text(
            "{{missing}}",
            &DataRow::new(),
            &FieldMapping::new(),
            CaseTransform::None,
        );
        assert_eq!(out, "");
    }

    #[test]
    fn unmapped_field_falls_back_to_raw_row_key() {
        let out = resolve_text(
            "{{city}}",
            &row(&[("city", "Lisbon")]),
            &FieldMapping::new(),
            CaseTransform::None,
        );
        assert_eq!(out, "Lisbon");
    }

    #[test]
    fn multiple_tokens_resolve_left_to_right() {
        let out = substitute_fields(
            "{{a}}-{{b}}-{{a}}",
            &row(&[("a", "1"), ("b", "2")]),
            &FieldMapping::new(),
        );
        assert_eq!(out, "1-2-1");
    }

    #[test]
    fn numeric_looking_values_stay_plain_text() {
        let out = substitute_fields(
            "{{price}}",
            &row(&[("price", "0042.50")]),
            &FieldMapping::new(),
        );
        assert_eq!(out, "0042.50");
    }

    #[test]
    fn unterminated_braces_are_literal() {
        let out = substitute_fields("oops {{name", &row(&[("name", "x")]), &FieldMapping::new());
        assert_eq!(out, "oops {{name");
    }

    #[test]
    fn capitalize_uppercases_word_starts_only() {
        assert_eq!(
            apply_case(CaseTransform::Capitalize, "hello wORLD  twice"),
            "Hello WORLD  Twice"
        );
    }

    #[test]
    fn transform_map_tracks_growing_chars() {
        // ß uppercases to SS: byte lengths change, the map must track it.
        let (out, map) = case_transform_with_map(CaseTransform::Uppercase, "aßb");
        assert_eq!(out, "ASSB");
        assert_eq!(map_logical_range(&map, 1, 1), Some(1..3));
        assert_eq!(map_logical_range(&map, 2, 2), Some(3..4));
        assert_eq!(map_logical_range(&map, 0, 2), Some(0..4));
        assert_eq!(map_logical_range(&map, 0, 9), None);
    }
}
