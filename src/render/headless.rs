//! Stateless per-row rendering: one template + one data row -> one image.
//!
//! The renderer owns its worker-local caches (fonts, images, layout
//! contexts) but no scene state; every row works from its own resolved
//! element clones, so rows can render on independent workers without any
//! shared mutable graph.

use std::path::PathBuf;

use crate::foundation::core::Canvas;
use crate::foundation::error::{PinError, PinResult};
use crate::model::campaign::{DataRow, FieldMapping, PinImage};
use crate::model::element::{Element, ElementKind};
use crate::model::template::Template;
use crate::render::paint::{
    PaintResources, canvas_u16, clear_pixmap, paint_element, paint_error_placeholder,
};
use crate::render::images::ImageCache;
use crate::resolve::fields::substitute_fields;
use crate::resolve::images::resolve_image_url;
use crate::text::fonts::{DirFontSource, FontRegistry, HttpFontSource};
use crate::text::layout::TextLayoutEngine;

/// Worker-context configuration for a renderer instance.
#[derive(Clone, Debug, Default)]
pub struct RendererConfig {
    /// Bundled font directory consulted before any remote source.
    pub font_dir: Option<PathBuf>,
    /// Remote font repository base URL.
    pub font_repo_url: Option<String>,
    /// Root for relative image paths.
    pub image_root: Option<PathBuf>,
    /// Allow http(s) image sources.
    pub remote_images: bool,
}

impl RendererConfig {
    pub fn build_font_registry(&self) -> FontRegistry {
        let mut fonts = FontRegistry::new();
        if let Some(dir) = &self.font_dir {
            fonts.push_source(Box::new(DirFontSource::new(dir)));
        }
        if let Some(url) = &self.font_repo_url {
            match HttpFontSource::new(url.clone()) {
                Ok(src) => fonts.push_source(Box::new(src)),
                Err(e) => tracing::warn!(error = %e, "remote font source unavailable"),
            }
        }
        fonts
    }

    pub fn build_image_cache(&self) -> ImageCache {
        let mut images = ImageCache::new();
        if let Some(root) = &self.image_root {
            images = images.with_root(root);
        }
        if self.remote_images {
            match images.with_http() {
                Ok(with_http) => return with_http,
                Err(e) => {
                    tracing::warn!(error = %e, "remote image fetching unavailable");
                    return self.build_image_cache_local();
                }
            }
        }
        images
    }

    fn build_image_cache_local(&self) -> ImageCache {
        let mut images = ImageCache::new();
        if let Some(root) = &self.image_root {
            images = images.with_root(root);
        }
        images
    }
}

/// Derive the per-row element: dynamic text substituted, dynamic image
/// source resolved. The template's own element is never touched, and no
/// derived element is shared between rows.
pub fn resolve_element(el: &Element, row: &DataRow, mapping: &FieldMapping) -> Element {
    let mut out = el.clone();
    match &mut out.kind {
        ElementKind::Text(t) => {
            // Dynamic text takes its content from the bound field; literal
            // text may still carry inline {{tokens}}.
            let raw = match (t.dynamic, &t.field) {
                (true, Some(field)) => format!("{{{{{field}}}}}"),
                _ => t.text.clone(),
            };
            // Case transform is applied at paint time so style spans can be
            // remapped through it; substitution happens here.
            t.text = substitute_fields(&raw, row, mapping);
        }
        ElementKind::Image(p) => {
            p.source = resolve_image_url(p, row, mapping);
            p.dynamic = false;
            p.field = None;
        }
        ElementKind::Shape(_) | ElementKind::Frame(_) => {}
    }
    out
}

/// Headless per-row renderer with worker-owned caches.
pub struct PinRenderer {
    fonts: FontRegistry,
    text: TextLayoutEngine,
    images: ImageCache,
}

impl PinRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            fonts: config.build_font_registry(),
            text: TextLayoutEngine::new(),
            images: config.build_image_cache(),
        }
    }

    /// Construct from pre-built parts (tests inject stub sources this way).
    pub fn with_parts(fonts: FontRegistry, images: ImageCache) -> Self {
        Self {
            fonts,
            text: TextLayoutEngine::new(),
            images,
        }
    }

    /// Render one template+row pair into premultiplied RGBA8.
    ///
    /// A single element's failure is caught, logged, and replaced with a
    /// visible placeholder; only a failure to produce the surface itself is
    /// a row failure.
    pub fn render(
        &mut self,
        template: &Template,
        row: &DataRow,
        mapping: &FieldMapping,
    ) -> PinResult<PinImage> {
        let canvas = template.canvas();
        let (w16, h16) = canvas_u16(canvas).map_err(row_error)?;

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        let bg = template.background.to_rgba8_premul();
        clear_pixmap(&mut pixmap, bg.to_array());

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);

        for idx in template.paint_order() {
            let el = resolve_element(&template.elements[idx], row, mapping);
            self.paint_one(&mut ctx, canvas, &el);
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        Ok(PinImage {
            width: canvas.width,
            height: canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }

    fn paint_one(&mut self, ctx: &mut vello_cpu::RenderContext, canvas: Canvas, el: &Element) {
        let mut res = PaintResources {
            fonts: &mut self.fonts,
            text: &mut self.text,
            images: &mut self.images,
        };
        if let Err(e) = paint_element(ctx, canvas, el, &mut res) {
            tracing::warn!(element = %el.id, error = %e, "element paint failed, placing marker");
            paint_error_placeholder(ctx, el);
        }
    }
}

fn row_error(e: PinError) -> PinError {
    PinError::row(e.to_string())
}
