//! Image fit-mode geometry, shared verbatim by both render targets.

use kurbo::{Affine, Rect};

use crate::model::element::FitMode;

/// How a source image lands in a target box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitPlacement {
    pub scale_x: f64,
    pub scale_y: f64,
    /// Top-left of the scaled image, in the target box's coordinate space.
    pub dx: f64,
    pub dy: f64,
    /// Present only for `cover`: the clip region, anchored at the box's own
    /// coordinates (never the image's).
    pub clip: Option<Rect>,
}

impl FitPlacement {
    /// Transform mapping image pixel space into the target box's space.
    pub fn transform(&self) -> Affine {
        Affine::translate((self.dx, self.dy)) * Affine::scale_non_uniform(self.scale_x, self.scale_y)
    }
}

/// Compute placement for a `src_w`x`src_h` image in `target`.
///
/// `fill` stretches with independent axis scales; `cover` scales uniformly
/// to fully cover and center-crops the overflow via the clip; `contain`
/// scales uniformly to fit inside and centers the remainder as padding.
pub fn place_image(src_w: f64, src_h: f64, target: Rect, mode: FitMode) -> FitPlacement {
    let tw = target.width();
    let th = target.height();
    let (sw, sh) = (src_w.max(1.0), src_h.max(1.0));

    match mode {
        FitMode::Fill => FitPlacement {
            scale_x: tw / sw,
            scale_y: th / sh,
            dx: target.x0,
            dy: target.y0,
            clip: None,
        },
        FitMode::Cover => {
            let s = (tw / sw).max(th / sh);
            FitPlacement {
                scale_x: s,
                scale_y: s,
                dx: target.x0 + (tw - sw * s) / 2.0,
                dy: target.y0 + (th - sh * s) / 2.0,
                clip: Some(target),
            }
        }
        FitMode::Contain => {
            let s = (tw / sw).min(th / sh);
            FitPlacement {
                scale_x: s,
                scale_y: s,
                dx: target.x0 + (tw - sw * s) / 2.0,
                dy: target.y0 + (th - sh * s) / 2.0,
                clip: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contain_is_height_limited_in_a_wide_box() {
        let p = place_image(100.0, 100.0, Rect::new(0.0, 0.0, 200.0, 50.0), FitMode::Contain);
        assert_eq!(p.scale_x, 0.5);
        assert_eq!(p.scale_y, 0.5);
        // No vertical remainder: centered vertically with zero offset.
        assert_eq!(p.dy, 0.0);
        // Horizontal remainder is centered as padding.
        assert_eq!(p.dx, 75.0);
        assert_eq!(p.clip, None);
    }

    #[test]
    fn cover_crops_with_a_box_anchored_clip() {
        let p = place_image(100.0, 100.0, Rect::new(0.0, 0.0, 200.0, 50.0), FitMode::Cover);
        assert_eq!(p.scale_x, 2.0);
        assert_eq!(p.scale_y, 2.0);
        // Width matches exactly: zero horizontal offset; overflow is vertical.
        assert_eq!(p.dx, 0.0);
        assert_eq!(p.dy, -75.0);
        assert_eq!(p.clip, Some(Rect::new(0.0, 0.0, 200.0, 50.0)));
    }

    #[test]
    fn cover_clip_follows_the_box_origin() {
        let p = place_image(100.0, 100.0, Rect::new(30.0, 40.0, 230.0, 90.0), FitMode::Cover);
        assert_eq!(p.clip, Some(Rect::new(30.0, 40.0, 230.0, 90.0)));
    }

    #[test]
    fn fill_stretches_each_axis_independently() {
        let p = place_image(100.0, 50.0, Rect::new(0.0, 0.0, 300.0, 300.0), FitMode::Fill);
        assert_eq!(p.scale_x, 3.0);
        assert_eq!(p.scale_y, 6.0);
        assert_eq!((p.dx, p.dy), (0.0, 0.0));
    }

    #[test]
    fn transform_maps_image_corners_into_the_box() {
        let p = place_image(100.0, 100.0, Rect::new(10.0, 10.0, 110.0, 110.0), FitMode::Fill);
        let t = p.transform();
        let corner = t * kurbo::Point::new(100.0, 100.0);
        assert!((corner.x - 110.0).abs() < 1e-9);
        assert!((corner.y - 110.0).abs() < 1e-9);
    }
}
