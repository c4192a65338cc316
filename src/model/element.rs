use kurbo::{Affine, Rect};
use serde::{Deserialize, Serialize};

use crate::model::color::ColorDef;

/// One visual primitive on the canvas.
///
/// `x,y` is the top-left of the untransformed bounding box; `rotation` is in
/// degrees about the element's own center; `opacity` multiplies the final
/// alpha of everything the element paints; `z_index` ascending is
/// bottom-to-top, ties broken by list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub z_index: i32,
    #[serde(flatten)]
    pub kind: ElementKind,
}

fn default_opacity() -> f64 {
    1.0
}

fn default_visible() -> bool {
    true
}

impl Element {
    /// Untransformed bounding box in canvas coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> kurbo::Point {
        self.bounds().center()
    }

    /// World transform for content drawn in the element's own box
    /// coordinates (origin at the box top-left).
    ///
    /// Both render targets must place elements through this one function;
    /// rotation is about the box center, applied after translation.
    pub fn place_transform(&self) -> Affine {
        let center = self.center();
        Affine::rotate_about(self.rotation.to_radians(), center)
            * Affine::translate((self.x, self.y))
    }

    /// Frames are visual guides; they never participate in hit testing.
    pub fn hit_testable(&self) -> bool {
        !matches!(self.kind, ElementKind::Frame(_))
    }
}

/// Closed set of element kinds, discriminated by the `type` JSON field.
///
/// Adding a kind extends this enum; every render/measure/sync match is then
/// checked for exhaustiveness by the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Text(TextProps),
    Image(ImageProps),
    Shape(ShapeProps),
    Frame(FrameProps),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProps {
    #[serde(default)]
    pub text: String,
    /// When set, `field` names the dynamic source column for this text.
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub font_style: FontStyleDef,
    #[serde(default = "ColorDef::black")]
    pub fill: ColorDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<StrokeStyle>,
    /// Outline-only rendering: fill is painted fully transparent and the
    /// stroke is forced on, regardless of the configured fill.
    #[serde(default)]
    pub hollow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<ShadowStyle>,
    #[serde(default)]
    pub align: TextAlign,
    /// Font-size-relative line height.
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default)]
    pub letter_spacing: f64,
    #[serde(default)]
    pub transform: CaseTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fit: Option<AutoFitSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<TextChip>,
    /// Per-character overrides, indexed over the resolved text before the
    /// case transform; `end` is inclusive. See [`normalize_style_ranges`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<StyleRange>,
}

fn default_font_family() -> String {
    "Inter".to_owned()
}

fn default_font_size() -> f64 {
    32.0
}

fn default_font_weight() -> u16 {
    400
}

fn default_line_height() -> f64 {
    1.2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontStyleDef {
    #[default]
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    #[default]
    Start,
    Center,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
    Capitalize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: ColorDef,
    #[serde(default = "default_stroke_width")]
    pub width: f64,
}

fn default_stroke_width() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowStyle {
    pub color: ColorDef,
    #[serde(default)]
    pub blur: f64,
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoFitSpec {
    #[serde(default = "default_min_font_size")]
    pub min_font_size: u32,
    #[serde(default = "default_max_font_size")]
    pub max_font_size: u32,
    /// Internal padding subtracted from both box dimensions before fitting.
    #[serde(default)]
    pub padding: f64,
    /// Soft preference; height-only fitting applies when no size satisfies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<u32>,
}

fn default_min_font_size() -> u32 {
    8
}

fn default_max_font_size() -> u32 {
    128
}

/// Background chip painted behind the text, sized to the text box plus
/// padding on all sides, grouped with the text for shadow and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextChip {
    pub color: ColorDef,
    #[serde(default)]
    pub padding: f64,
    #[serde(default)]
    pub corner_radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StyleRange {
    pub start: usize,
    /// Inclusive end character index.
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<ColorDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<FontStyleDef>,
}

/// Sort ranges, clip them to `char_len`, and drop the overlapped tail of any
/// range that collides with an earlier one. Earlier (lower `start`) ranges
/// win overlaps.
pub fn normalize_style_ranges(spans: &[StyleRange], char_len: usize) -> Vec<StyleRange> {
    let mut out: Vec<StyleRange> = spans
        .iter()
        .filter(|s| s.start <= s.end && s.start < char_len)
        .map(|s| StyleRange {
            end: s.end.min(char_len.saturating_sub(1)),
            ..*s
        })
        .collect();
    out.sort_by_key(|s| (s.start, s.end));

    let mut next_free = 0usize;
    out.retain_mut(|s| {
        if s.end < next_free {
            return false;
        }
        if s.start < next_free {
            s.start = next_free;
        }
        next_free = s.end + 1;
        true
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageProps {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub fit: FitMode,
    #[serde(default)]
    pub corner_radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Stretch to exactly the target box (independent X/Y scale).
    Fill,
    /// Uniform scale to fully cover the box, center-cropped by a clip
    /// anchored at the box's own coordinates.
    #[default]
    Cover,
    /// Uniform scale to fit entirely inside the box, centered.
    Contain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeProps {
    #[serde(default)]
    pub shape: ShapeGeometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<ColorDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<StrokeStyle>,
    /// Rect shapes only; a circle has no corners and path data carries its own.
    #[serde(default)]
    pub corner_radius: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeGeometry {
    #[default]
    Rect,
    Circle,
    Path {
        d: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameProps {
    #[serde(default = "default_frame_stroke")]
    pub stroke: StrokeStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<ColorDef>,
}

fn default_frame_stroke() -> StrokeStyle {
    StrokeStyle {
        color: ColorDef::rgba(0.5, 0.5, 0.5, 1.0),
        width: 1.0,
    }
}
