use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::foundation::core::Canvas;
use crate::foundation::error::{PinError, PinResult};
use crate::model::color::ColorDef;
use crate::model::element::{Element, ElementKind, ShapeGeometry};

/// A canvas plus an ordered element list, authored once and reused across
/// many data rows. The engine only ever reads templates; per-row output is
/// derived from cloned elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub width: u32,
    pub height: u32,
    #[serde(default = "ColorDef::white")]
    pub background: ColorDef,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Template {
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    pub fn validate(&self) -> PinResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PinError::validation("canvas width/height must be > 0"));
        }

        let mut ids = BTreeSet::new();
        for el in &self.elements {
            if el.id.is_empty() {
                return Err(PinError::validation("element id must be non-empty"));
            }
            if !ids.insert(el.id.as_str()) {
                return Err(PinError::validation(format!(
                    "duplicate element id '{}'",
                    el.id
                )));
            }
            if !(el.width.is_finite() && el.height.is_finite()) || el.width < 0.0 || el.height < 0.0
            {
                return Err(PinError::validation(format!(
                    "element '{}' has invalid size",
                    el.id
                )));
            }

            match &el.kind {
                ElementKind::Text(t) => {
                    if let Some(fit) = &t.auto_fit
                        && fit.min_font_size > fit.max_font_size
                    {
                        return Err(PinError::validation(format!(
                            "element '{}' auto_fit min_font_size exceeds max_font_size",
                            el.id
                        )));
                    }
                    for s in &t.spans {
                        if s.start > s.end {
                            return Err(PinError::validation(format!(
                                "element '{}' has a span with start > end",
                                el.id
                            )));
                        }
                    }
                }
                ElementKind::Shape(s) => {
                    if let ShapeGeometry::Path { d } = &s.shape
                        && kurbo::BezPath::from_svg(d).is_err()
                    {
                        return Err(PinError::validation(format!(
                            "element '{}' has unparseable path data",
                            el.id
                        )));
                    }
                }
                ElementKind::Image(_) | ElementKind::Frame(_) => {}
            }
        }

        Ok(())
    }

    /// Indices of visible elements in paint order: ascending `z_index`,
    /// ties keeping list order. Invisible elements are absent entirely:
    /// they are neither painted nor measured.
    pub fn paint_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.visible)
            .map(|(i, _)| i)
            .collect();
        order.sort_by_key(|&i| (self.elements[i].z_index, i));
        order
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|el| el.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape(id: &str, z: i32, visible: bool) -> Element {
        serde_json::from_value(json!({
            "id": id, "type": "shape",
            "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0,
            "z_index": z, "visible": visible
        }))
        .unwrap()
    }

    #[test]
    fn paint_order_sorts_by_z_then_list_position() {
        let t = Template {
            width: 100,
            height: 100,
            background: ColorDef::white(),
            elements: vec![
                shape("a", 2, true),
                shape("b", 0, true),
                shape("c", 2, true),
                shape("d", 1, false),
            ],
        };
        // "d" is invisible and skipped; "a" and "c" tie on z and keep list order.
        assert_eq!(t.paint_order(), vec![1, 0, 2]);
    }

    #[test]
    fn validate_rejects_duplicate_ids_and_bad_paths() {
        let mut t = Template {
            width: 100,
            height: 100,
            background: ColorDef::white(),
            elements: vec![shape("a", 0, true), shape("a", 1, true)],
        };
        assert!(t.validate().is_err());

        t.elements = vec![
            serde_json::from_value(json!({
                "id": "p", "type": "shape",
                "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0,
                "shape": {"path": {"d": "not a path"}}
            }))
            .unwrap(),
        ];
        assert!(t.validate().is_err());
    }

    #[test]
    fn zero_canvas_is_rejected() {
        let t = Template {
            width: 0,
            height: 100,
            background: ColorDef::white(),
            elements: vec![],
        };
        assert!(t.validate().is_err());
    }
}
