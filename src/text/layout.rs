use std::ops::Range;

use crate::foundation::error::{PinError, PinResult};
use crate::model::element::{FontStyleDef, TextAlign};

/// RGBA8 brush color carried through Parley layouts (straight alpha).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// A style override resolved to a byte range of the laid-out string.
#[derive(Clone, Debug)]
pub struct ResolvedSpan {
    pub range: Range<usize>,
    pub brush: Option<TextBrushRgba8>,
    pub weight: Option<u16>,
    pub style: Option<FontStyleDef>,
}

/// Everything the layout needs besides the text itself.
pub struct TextStyleSpec<'a> {
    pub font_bytes: &'a [u8],
    pub size_px: f32,
    pub brush: TextBrushRgba8,
    pub weight: u16,
    pub style: FontStyleDef,
    /// Font-size-relative line height.
    pub line_height: f32,
    pub letter_spacing: f32,
    pub align: TextAlign,
    /// Wrap width; `None` lays out a single unconstrained paragraph.
    pub max_width: Option<f32>,
    pub spans: &'a [ResolvedSpan],
}

/// Line-level measurement of a finished layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasuredText {
    pub width: f64,
    pub height: f64,
    pub lines: usize,
}

/// Stateful helper for building Parley text layouts from raw font bytes.
///
/// Word-boundary wrapping is Parley's default break policy; measurement and
/// painting go through the same `layout` call, so the wrap policy cannot
/// diverge between the auto-fit search and the final paint.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape and lay out text using the provided font bytes and styling.
    pub fn layout(
        &mut self,
        text: &str,
        spec: &TextStyleSpec<'_>,
    ) -> PinResult<parley::Layout<TextBrushRgba8>> {
        if !spec.size_px.is_finite() || spec.size_px <= 0.0 {
            return Err(PinError::validation("text size_px must be finite and > 0"));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(spec.font_bytes.to_vec()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| PinError::font("no font families registered from font bytes"))?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| PinError::font("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(spec.size_px));
        builder.push_default(parley::style::StyleProperty::Brush(spec.brush));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(spec.weight as f32),
        ));
        if spec.style == FontStyleDef::Italic {
            builder.push_default(parley::style::StyleProperty::FontStyle(
                parley::style::FontStyle::Italic,
            ));
        }
        builder.push_default(parley::style::StyleProperty::LineHeight(
            parley::style::LineHeight::FontSizeRelative(spec.line_height),
        ));
        if spec.letter_spacing != 0.0 {
            builder.push_default(parley::style::StyleProperty::LetterSpacing(
                spec.letter_spacing,
            ));
        }

        for span in spec.spans {
            if span.range.start >= span.range.end || span.range.end > text.len() {
                continue;
            }
            if let Some(brush) = span.brush {
                builder.push(
                    parley::style::StyleProperty::Brush(brush),
                    span.range.clone(),
                );
            }
            if let Some(w) = span.weight {
                builder.push(
                    parley::style::StyleProperty::FontWeight(parley::style::FontWeight::new(
                        w as f32,
                    )),
                    span.range.clone(),
                );
            }
            if span.style == Some(FontStyleDef::Italic) {
                builder.push(
                    parley::style::StyleProperty::FontStyle(parley::style::FontStyle::Italic),
                    span.range.clone(),
                );
            }
        }

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        match spec.max_width {
            Some(w) => {
                layout.break_all_lines(Some(w));
                layout.align(
                    Some(w),
                    parley_alignment(spec.align),
                    parley::AlignmentOptions::default(),
                );
            }
            None => {
                layout.break_all_lines(None);
                layout.align(
                    None,
                    parley_alignment(spec.align),
                    parley::AlignmentOptions::default(),
                );
            }
        }

        Ok(layout)
    }

    /// Layout and reduce to the metrics the auto-fit search needs.
    pub fn measure(&mut self, text: &str, spec: &TextStyleSpec<'_>) -> PinResult<MeasuredText> {
        let layout = self.layout(text, spec)?;
        Ok(MeasuredText {
            width: layout.width() as f64,
            height: layout.height() as f64,
            lines: layout.lines().count(),
        })
    }
}

fn parley_alignment(align: TextAlign) -> parley::Alignment {
    match align {
        TextAlign::Start => parley::Alignment::Start,
        TextAlign::Center => parley::Alignment::Center,
        TextAlign::End => parley::Alignment::End,
    }
}
