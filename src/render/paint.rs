//! Per-variant element painters for the headless renderer.
//!
//! One paint function per [`ElementKind`] variant, selected by pattern
//! match. Every geometry decision (placement transform, fit-mode math, wrap
//! width) goes through the shared model/fit helpers so the interactive
//! adapter and this painter cannot disagree.

use kurbo::{Affine, Rect, Shape as _};

use crate::foundation::core::Canvas;
use crate::foundation::error::{PinError, PinResult};
use crate::model::color::ColorDef;
use crate::model::element::{
    Element, ElementKind, FrameProps, ImageProps, ShapeGeometry, ShapeProps, StrokeStyle,
    TextProps, normalize_style_ranges,
};
use crate::render::blur::blur_rgba8_premul;
use crate::render::fit::place_image;
use crate::render::images::{ImageCache, PreparedImage};
use crate::resolve::fields::{case_transform_with_map, map_logical_range};
use crate::text::autofit::{TextMetrics, best_fit_font_size};
use crate::text::fonts::FontRegistry;
use crate::text::layout::{ResolvedSpan, TextBrushRgba8, TextLayoutEngine, TextStyleSpec};

/// Worker-owned caches the painters draw from. No IO happens outside these.
pub struct PaintResources<'a> {
    pub fonts: &'a mut FontRegistry,
    pub text: &'a mut TextLayoutEngine,
    pub images: &'a mut ImageCache,
}

/// Paint one already-row-resolved element into the context.
///
/// Errors are recoverable by design: the caller replaces a failed element
/// with [`paint_error_placeholder`] and moves on.
pub fn paint_element(
    ctx: &mut vello_cpu::RenderContext,
    canvas: Canvas,
    el: &Element,
    res: &mut PaintResources<'_>,
) -> PinResult<()> {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

    match &el.kind {
        ElementKind::Text(t) => paint_text(ctx, canvas, el, t, res),
        ElementKind::Image(p) => paint_image(ctx, el, p, res),
        ElementKind::Shape(s) => paint_shape(ctx, el, s),
        ElementKind::Frame(f) => paint_frame(ctx, el, f),
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

fn paint_text(
    ctx: &mut vello_cpu::RenderContext,
    canvas: Canvas,
    el: &Element,
    t: &TextProps,
    res: &mut PaintResources<'_>,
) -> PinResult<()> {
    let (display, char_map) = case_transform_with_map(t.transform, &t.text);
    if display.is_empty() {
        return Ok(());
    }

    let font = res.fonts.resolve(&t.font_family)?;

    let spans = resolved_spans(t, &char_map);

    let pad = t.auto_fit.map(|f| f.padding).unwrap_or(0.0);
    let wrap_w = (el.width - 2.0 * pad).max(1.0);

    let size_px = match &t.auto_fit {
        Some(fit) => {
            let engine = &mut *res.text;
            let mut measurer = |text: &str, size: f64, max_w: f64| -> PinResult<TextMetrics> {
                let spec = style_spec(t, &font.bytes, size as f32, max_w as f32, &spans);
                engine
                    .measure(text, &spec)
                    .map(|m| TextMetrics {
                        height: m.height,
                        lines: m.lines,
                    })
            };
            best_fit_font_size(&mut measurer, &display, el.width, el.height, fit)? as f64
        }
        None => t.font_size,
    };

    let spec = style_spec(t, &font.bytes, size_px as f32, wrap_w as f32, &spans);
    let layout = res.text.layout(&display, &spec)?;

    let unit = el.place_transform() * Affine::translate((pad, pad));

    let chip_path = t.background.map(|bg| {
        let r = Rect::new(
            -bg.padding,
            -bg.padding,
            layout.width() as f64 + bg.padding,
            layout.height() as f64 + bg.padding,
        );
        kurbo::RoundedRect::from_rect(r, bg.corner_radius.max(0.0)).to_path(0.25)
    });

    if el.opacity < 1.0 {
        ctx.push_opacity_layer(el.opacity as f32);
    }

    // Shadow first: the whole unit (chip + glyphs) rasterized in shadow
    // color, blurred, and composited at the configured offset.
    if let Some(shadow) = &t.shadow {
        let shadow_px = rasterize_text_unit(
            canvas,
            &layout,
            &font.bytes,
            unit,
            shadow.color,
            chip_path.as_ref(),
            t,
        )?;
        let radius = shadow.blur.max(0.0).ceil() as u32;
        let sigma = ((shadow.blur / 2.0).max(0.5)) as f32;
        let blurred = blur_rgba8_premul(&shadow_px, canvas.width, canvas.height, radius, sigma)?;
        let paint = image_paint_from_premul(&blurred, canvas.width, canvas.height)?;

        ctx.set_transform(affine_to_cpu(Affine::translate((shadow.dx, shadow.dy))));
        ctx.set_paint(paint);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            canvas.width as f64,
            canvas.height as f64,
        ));
    }

    if let (Some(bg), Some(path)) = (&t.background, &chip_path) {
        ctx.set_transform(affine_to_cpu(unit));
        ctx.set_paint(color_paint(bg.color));
        ctx.fill_path(&bezpath_to_cpu(path));
    }

    paint_glyph_runs(ctx, &layout, &font.bytes, unit, t, None);

    if el.opacity < 1.0 {
        ctx.pop_layer();
    }

    Ok(())
}

fn style_spec<'a>(
    t: &TextProps,
    font_bytes: &'a [u8],
    size_px: f32,
    wrap_w: f32,
    spans: &'a [ResolvedSpan],
) -> TextStyleSpec<'a> {
    TextStyleSpec {
        font_bytes,
        size_px,
        brush: brush_of(t.fill),
        weight: t.font_weight,
        style: t.font_style,
        line_height: t.line_height as f32,
        letter_spacing: t.letter_spacing as f32,
        align: t.align,
        max_width: Some(wrap_w),
        spans,
    }
}

fn resolved_spans(t: &TextProps, char_map: &[std::ops::Range<usize>]) -> Vec<ResolvedSpan> {
    normalize_style_ranges(&t.spans, char_map.len())
        .into_iter()
        .filter_map(|s| {
            let range = map_logical_range(char_map, s.start, s.end)?;
            Some(ResolvedSpan {
                range,
                brush: s.fill.map(brush_of),
                weight: s.font_weight,
                style: s.font_style,
            })
        })
        .collect()
}

/// Draw the glyph runs of a finished layout.
///
/// `color_override` replaces every run brush (used for the shadow pass).
/// Hollow text never fills: the stroke is forced and the fill is fully
/// transparent, not the configured fill color.
fn paint_glyph_runs(
    ctx: &mut vello_cpu::RenderContext,
    layout: &parley::Layout<TextBrushRgba8>,
    font_bytes: &[u8],
    unit: Affine,
    t: &TextProps,
    color_override: Option<ColorDef>,
) {
    let font = vello_cpu::peniko::FontData::new(
        vello_cpu::peniko::Blob::from(font_bytes.to_vec()),
        0,
    );

    ctx.set_transform(affine_to_cpu(unit));

    let stroke = text_stroke(t);

    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let glyphs: Vec<vello_cpu::Glyph> = run
                .glyphs()
                .map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                })
                .collect();
            let font_size = run.run().font_size();

            if !t.hollow {
                let brush = match color_override {
                    Some(c) => brush_of(c),
                    None => run.style().brush,
                };
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                ctx.glyph_run(&font)
                    .font_size(font_size)
                    .fill_glyphs(glyphs.iter().copied());
            }

            if let Some(stroke) = &stroke {
                let color = color_override.unwrap_or(stroke.color);
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(stroke.width));
                ctx.set_paint(color_paint(color));
                ctx.glyph_run(&font)
                    .font_size(font_size)
                    .stroke_glyphs(glyphs.iter().copied());
            }
        }
    }
}

/// Effective text stroke: the configured one, or a 1px outline in the fill
/// color when `hollow` is set with no stroke configured.
fn text_stroke(t: &TextProps) -> Option<StrokeStyle> {
    match (&t.stroke, t.hollow) {
        (Some(s), _) => Some(*s),
        (None, true) => Some(StrokeStyle {
            color: t.fill,
            width: 1.0,
        }),
        (None, false) => None,
    }
}

/// Rasterize chip + glyphs in a single flat color into a canvas-sized
/// premultiplied RGBA8 buffer (the shadow source).
fn rasterize_text_unit(
    canvas: Canvas,
    layout: &parley::Layout<TextBrushRgba8>,
    font_bytes: &[u8],
    unit: Affine,
    color: ColorDef,
    chip_path: Option<&kurbo::BezPath>,
    t: &TextProps,
) -> PinResult<Vec<u8>> {
    let (w16, h16) = canvas_u16(canvas)?;
    let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
    let mut sctx = vello_cpu::RenderContext::new(w16, h16);
    sctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

    if let Some(path) = chip_path {
        sctx.set_transform(affine_to_cpu(unit));
        sctx.set_paint(color_paint(color));
        sctx.fill_path(&bezpath_to_cpu(path));
    }

    paint_glyph_runs(&mut sctx, layout, font_bytes, unit, t, Some(color));

    sctx.flush();
    sctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap.data_as_u8_slice().to_vec())
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

fn paint_image(
    ctx: &mut vello_cpu::RenderContext,
    el: &Element,
    p: &ImageProps,
    res: &mut PaintResources<'_>,
) -> PinResult<()> {
    let Some(img) = res.images.get(&p.source) else {
        // Missing image is not an element failure: the row still succeeds,
        // with a visibly marked box where the image would be.
        paint_image_placeholder(ctx, el);
        return Ok(());
    };

    let local_box = Rect::new(0.0, 0.0, el.width, el.height);
    let place = el.place_transform();
    let fit = place_image(img.width as f64, img.height as f64, local_box, p.fit);

    if el.opacity < 1.0 {
        ctx.push_opacity_layer(el.opacity as f32);
    }

    let mut clip_layers = 0u32;
    ctx.set_transform(affine_to_cpu(place));
    if p.corner_radius > 0.0 {
        let rounded = kurbo::RoundedRect::from_rect(local_box, p.corner_radius).to_path(0.25);
        ctx.push_clip_layer(&bezpath_to_cpu(&rounded));
        clip_layers += 1;
    }
    if let Some(clip) = fit.clip {
        ctx.push_clip_layer(&bezpath_to_cpu(&clip.to_path(0.1)));
        clip_layers += 1;
    }

    ctx.set_transform(affine_to_cpu(place * fit.transform()));
    ctx.set_paint(image_paint(&img)?);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        img.width as f64,
        img.height as f64,
    ));

    for _ in 0..clip_layers {
        ctx.pop_layer();
    }
    if el.opacity < 1.0 {
        ctx.pop_layer();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Shape / frame
// ---------------------------------------------------------------------------

fn shape_path(el: &Element, s: &ShapeProps) -> PinResult<kurbo::BezPath> {
    let local_box = Rect::new(0.0, 0.0, el.width, el.height);
    match &s.shape {
        ShapeGeometry::Rect => {
            if s.corner_radius > 0.0 {
                Ok(kurbo::RoundedRect::from_rect(local_box, s.corner_radius).to_path(0.25))
            } else {
                Ok(local_box.to_path(0.1))
            }
        }
        ShapeGeometry::Circle => {
            let ellipse = kurbo::Ellipse::new(
                local_box.center(),
                (el.width / 2.0, el.height / 2.0),
                0.0,
            );
            Ok(ellipse.to_path(0.25))
        }
        ShapeGeometry::Path { d } => kurbo::BezPath::from_svg(d)
            .map_err(|e| PinError::element(format!("bad path data on '{}': {e}", el.id))),
    }
}

fn paint_shape(
    ctx: &mut vello_cpu::RenderContext,
    el: &Element,
    s: &ShapeProps,
) -> PinResult<()> {
    let path = bezpath_to_cpu(&shape_path(el, s)?);

    ctx.set_transform(affine_to_cpu(el.place_transform()));
    if el.opacity < 1.0 {
        ctx.push_opacity_layer(el.opacity as f32);
    }

    if let Some(fill) = s.fill {
        ctx.set_paint(color_paint(fill));
        ctx.fill_path(&path);
    }
    if let Some(stroke) = &s.stroke {
        ctx.set_stroke(vello_cpu::kurbo::Stroke::new(stroke.width));
        ctx.set_paint(color_paint(stroke.color));
        ctx.stroke_path(&path);
    }

    if el.opacity < 1.0 {
        ctx.pop_layer();
    }
    Ok(())
}

fn paint_frame(
    ctx: &mut vello_cpu::RenderContext,
    el: &Element,
    f: &FrameProps,
) -> PinResult<()> {
    let path = bezpath_to_cpu(&Rect::new(0.0, 0.0, el.width, el.height).to_path(0.1));

    ctx.set_transform(affine_to_cpu(el.place_transform()));
    if el.opacity < 1.0 {
        ctx.push_opacity_layer(el.opacity as f32);
    }

    if let Some(fill) = f.fill {
        ctx.set_paint(color_paint(fill));
        ctx.fill_path(&path);
    }
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f.stroke.width));
    ctx.set_paint(color_paint(f.stroke.color));
    ctx.stroke_path(&path);

    if el.opacity < 1.0 {
        ctx.pop_layer();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Placeholders
// ---------------------------------------------------------------------------

/// Neutral marked box for a missing/undecodable image.
pub fn paint_image_placeholder(ctx: &mut vello_cpu::RenderContext, el: &Element) {
    paint_marked_box(
        ctx,
        el,
        ColorDef::rgba(0.88, 0.88, 0.88, 1.0),
        ColorDef::rgba(0.55, 0.55, 0.55, 1.0),
    );
}

/// Loud marked box replacing an element whose paint failed.
pub fn paint_error_placeholder(ctx: &mut vello_cpu::RenderContext, el: &Element) {
    paint_marked_box(
        ctx,
        el,
        ColorDef::rgba(1.0, 0.9, 0.9, 1.0),
        ColorDef::rgba(0.85, 0.2, 0.2, 1.0),
    );
}

fn paint_marked_box(
    ctx: &mut vello_cpu::RenderContext,
    el: &Element,
    fill: ColorDef,
    mark: ColorDef,
) {
    let local_box = Rect::new(0.0, 0.0, el.width.max(1.0), el.height.max(1.0));
    let box_path = bezpath_to_cpu(&local_box.to_path(0.1));

    ctx.set_transform(affine_to_cpu(el.place_transform()));
    if el.opacity < 1.0 {
        ctx.push_opacity_layer(el.opacity as f32);
    }

    ctx.set_paint(color_paint(fill));
    ctx.fill_path(&box_path);

    let mut cross = kurbo::BezPath::new();
    cross.move_to((0.0, 0.0));
    cross.line_to((local_box.x1, local_box.y1));
    cross.move_to((local_box.x1, 0.0));
    cross.line_to((0.0, local_box.y1));

    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(2.0));
    ctx.set_paint(color_paint(mark));
    ctx.stroke_path(&box_path);
    ctx.stroke_path(&bezpath_to_cpu(&cross));

    if el.opacity < 1.0 {
        ctx.pop_layer();
    }
}

// ---------------------------------------------------------------------------
// vello_cpu glue
// ---------------------------------------------------------------------------

pub(crate) fn canvas_u16(canvas: Canvas) -> PinResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| PinError::validation("canvas width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| PinError::validation("canvas height exceeds u16"))?;
    Ok((w, h))
}

pub(crate) fn color_paint(c: ColorDef) -> vello_cpu::peniko::Color {
    let [r, g, b, a] = c.to_rgba8_straight();
    vello_cpu::peniko::Color::from_rgba8(r, g, b, a)
}

pub(crate) fn brush_of(c: ColorDef) -> TextBrushRgba8 {
    let [r, g, b, a] = c.to_rgba8_straight();
    TextBrushRgba8 { r, g, b, a }
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

pub(crate) fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

pub(crate) fn image_paint(img: &PreparedImage) -> PinResult<vello_cpu::Image> {
    image_paint_from_premul(img.rgba8_premul.as_slice(), img.width, img.height)
}

fn image_paint_from_premul(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> PinResult<vello_cpu::Image> {
    let pixmap = image_premul_bytes_to_pixmap(rgba8_premul, width, height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(std::sync::Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

pub(crate) fn image_premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> PinResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| PinError::element("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| PinError::element("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(PinError::element("prepared image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

pub(crate) fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba: [u8; 4]) {
    let data = pixmap.data_as_u8_slice_mut();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}
