//! Auto-fit font sizing: find the largest integer font size whose wrapped
//! text stays inside a fixed box.

use crate::foundation::error::PinResult;
use crate::model::element::AutoFitSpec;

/// Height/line-count outcome of measuring text at one candidate size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    pub height: f64,
    pub lines: usize,
}

/// Pluggable measurement function. The renderer backs this with the same
/// Parley layout it paints with; a measurement pass with a different wrap
/// policy than the paint pass would invalidate the whole search.
pub trait TextMeasure {
    fn measure(&mut self, text: &str, font_size_px: f64, max_width: f64) -> PinResult<TextMetrics>;
}

impl<F> TextMeasure for F
where
    F: FnMut(&str, f64, f64) -> PinResult<TextMetrics>,
{
    fn measure(&mut self, text: &str, font_size_px: f64, max_width: f64) -> PinResult<TextMetrics> {
        self(text, font_size_px, max_width)
    }
}

/// Guard against borderline overflow from measurement rounding.
pub const FIT_SAFETY_MARGIN_PX: f64 = 2.0;

const MAX_SEARCH_ITERATIONS: u32 = 30;

/// Largest integer font size in `[min_font_size, max_font_size]` whose
/// measured text fits the padded box.
///
/// Pass 1 honors `max_lines` as well as height; pass 2 (only when pass 1
/// finds nothing) retries height-only; the line preference is soft. When
/// nothing fits at all the minimum size is returned and overflow is allowed;
/// this function never fails on "too much text". Relies on measurement being
/// monotonic: a larger size never renders shorter or narrower.
pub fn best_fit_font_size(
    measure: &mut dyn TextMeasure,
    text: &str,
    box_width: f64,
    box_height: f64,
    fit: &AutoFitSpec,
) -> PinResult<u32> {
    let min = fit.min_font_size.min(fit.max_font_size);
    let max = fit.max_font_size.max(fit.min_font_size);

    if text.trim().is_empty() {
        return Ok(max);
    }

    let avail_w = (box_width - 2.0 * fit.padding).max(1.0);
    let avail_h = (box_height - 2.0 * fit.padding - FIT_SAFETY_MARGIN_PX).max(1.0);

    if let Some(size) = search_pass(measure, text, avail_w, avail_h, min, max, fit.max_lines)? {
        return Ok(size);
    }
    if fit.max_lines.is_some()
        && let Some(size) = search_pass(measure, text, avail_w, avail_h, min, max, None)?
    {
        return Ok(size);
    }

    Ok(min)
}

fn search_pass(
    measure: &mut dyn TextMeasure,
    text: &str,
    avail_w: f64,
    avail_h: f64,
    min: u32,
    max: u32,
    max_lines: Option<u32>,
) -> PinResult<Option<u32>> {
    let mut lo = min;
    let mut hi = max;
    let mut best = None;
    let mut iterations = 0u32;

    while lo <= hi && iterations < MAX_SEARCH_ITERATIONS {
        iterations += 1;
        let mid = lo + (hi - lo) / 2;
        let m = measure.measure(text, mid as f64, avail_w)?;

        let fits_height = m.height <= avail_h;
        let fits_lines = max_lines.is_none_or(|n| m.lines as u32 <= n.max(1));

        if fits_height && fits_lines {
            best = Some(mid);
            if mid == u32::MAX {
                break;
            }
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic monotonic model: glyphs are `0.6 * size` wide, lines are
    /// `1.2 * size` tall, wrapping at word boundaries by character count.
    struct ModelMeasure;

    impl TextMeasure for ModelMeasure {
        fn measure(
            &mut self,
            text: &str,
            font_size_px: f64,
            max_width: f64,
        ) -> PinResult<TextMetrics> {
            let glyph_w = font_size_px * 0.6;
            let chars_per_line = ((max_width / glyph_w).floor() as usize).max(1);

            let mut lines = 1usize;
            let mut current = 0usize;
            for word in text.split_whitespace() {
                let needed = word.chars().count() + usize::from(current > 0);
                if current + needed > chars_per_line && current > 0 {
                    lines += 1;
                    current = word.chars().count();
                } else {
                    current += needed;
                }
            }

            Ok(TextMetrics {
                height: lines as f64 * font_size_px * 1.2,
                lines,
            })
        }
    }

    fn fit(min: u32, max: u32, max_lines: Option<u32>) -> AutoFitSpec {
        AutoFitSpec {
            min_font_size: min,
            max_font_size: max,
            padding: 4.0,
            max_lines,
        }
    }

    #[test]
    fn result_is_always_within_bounds() {
        let mut m = ModelMeasure;
        let size =
            best_fit_font_size(&mut m, "hello world", 300.0, 100.0, &fit(8, 64, None)).unwrap();
        assert!((8..=64).contains(&size));
    }

    #[test]
    fn monotonic_in_box_size() {
        let mut m = ModelMeasure;
        let text = "the quick brown fox jumps over the lazy dog";
        let small = best_fit_font_size(&mut m, text, 200.0, 80.0, &fit(8, 96, None)).unwrap();
        let large = best_fit_font_size(&mut m, text, 400.0, 160.0, &fit(8, 96, None)).unwrap();
        assert!(large >= small, "larger box returned smaller size");
    }

    #[test]
    fn max_lines_is_a_soft_preference() {
        let mut m = ModelMeasure;
        let text = "a very long headline that wants to wrap over many lines";
        // Constrained pass may fail; the height-only pass must still answer.
        let size = best_fit_font_size(&mut m, text, 120.0, 400.0, &fit(8, 96, Some(1))).unwrap();
        assert!((8..=96).contains(&size));

        let unconstrained =
            best_fit_font_size(&mut m, text, 120.0, 400.0, &fit(8, 96, None)).unwrap();
        assert!(unconstrained >= size);
    }

    #[test]
    fn overflow_falls_back_to_min_size() {
        let mut m = ModelMeasure;
        let text = "far far far far far too much text for this tiny box to ever hold";
        let size = best_fit_font_size(&mut m, text, 20.0, 10.0, &fit(12, 48, Some(1))).unwrap();
        assert_eq!(size, 12);
    }

    #[test]
    fn empty_text_uses_max_size() {
        let mut m = ModelMeasure;
        let size = best_fit_font_size(&mut m, "   ", 100.0, 100.0, &fit(8, 40, None)).unwrap();
        assert_eq!(size, 40);
    }
}
