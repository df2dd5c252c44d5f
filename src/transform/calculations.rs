//! Pure geometry for the transform planner.
//!
//! Nothing here touches pixels; every function maps sizes and parameters to
//! sizes, factors or rectangles so it can be tested in isolation.

use crate::params::TransformParams;
use crate::types::{Anchor, Kernel, ResizeStrategy};

/// `x / y`, exactly 1 when the two are equal.
pub fn ratio(x: u32, y: u32) -> f64 {
    if x == y {
        1.0
    } else {
        f64::from(x) / f64::from(y)
    }
}

/// Target geometry resolved against the source size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Targets {
    /// 0 when no resize was asked for.
    pub width: u32,
    pub height: u32,
    /// Uniform relative scale, when both dimensions were given as the same
    /// fraction.
    pub scale: Option<f64>,
    pub crop_offset_x: i64,
    pub crop_offset_y: i64,
}

fn to_dimension(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Resolve the requested width, height and crop offsets against a source of
/// `source` pixels.
///
/// # Examples
/// ```
/// # use pixform::transform::calculations::resolve_targets;
/// # use pixform::{Scalar, TransformParams};
/// let params = TransformParams {
///     width: Scalar::value_of(320.0),
///     ..Default::default()
/// };
/// let targets = resolve_targets((640, 480), &params);
/// assert_eq!((targets.width, targets.height), (320, 240));
/// ```
pub fn resolve_targets(source: (u32, u32), params: &TransformParams) -> Targets {
    let (src_w, src_h) = source;
    let mut targets = Targets {
        crop_offset_x: params.crop_offset_x.resolve(src_w),
        crop_offset_y: params.crop_offset_y.resolve(src_h),
        ..Targets::default()
    };
    if params.width.value == 0.0 && params.height.value == 0.0 {
        return targets;
    }

    targets.width = to_dimension(params.width.resolve(src_w));
    targets.height = to_dimension(params.height.resolve(src_h));

    if params.max_scale > 0.0 {
        if targets.width > 0 && ratio(targets.width, src_w) > params.max_scale {
            targets.width = (f64::from(src_w) * params.max_scale) as u32;
        }
        if targets.height > 0 && ratio(targets.height, src_h) > params.max_scale {
            targets.height = (f64::from(src_h) * params.max_scale) as u32;
        }
    }

    match (targets.width, targets.height) {
        (0, 0) => {}
        (w, 0) => targets.height = (ratio(w, src_w) * f64::from(src_h)).round().max(1.0) as u32,
        (0, h) => targets.width = (ratio(h, src_h) * f64::from(src_w)).round().max(1.0) as u32,
        _ => {}
    }

    if params.width.relative && params.height.relative {
        let (mut sx, mut sy) = (params.width.value, params.height.value);
        if sx == 0.0 {
            sx = sy;
        } else if sy == 0.0 {
            sy = sx;
        }
        if sx == sy && sx > 0.0 {
            let capped = if params.max_scale > 0.0 { sx.min(params.max_scale) } else { sx };
            targets.scale = Some(capped);
        }
    }

    targets
}

/// Reconcile the two shrink factors according to the fit strategy.
///
/// Crop keeps the smaller factor so the short side fills the target, embed
/// and auto keep the larger so the whole image fits, stretch keeps both.
pub fn unify_shrink(shrink_x: f64, shrink_y: f64, strategy: ResizeStrategy) -> (f64, f64) {
    match strategy {
        ResizeStrategy::Stretch => (shrink_x, shrink_y),
        ResizeStrategy::Crop => {
            let s = shrink_x.min(shrink_y);
            (s, s)
        }
        ResizeStrategy::Embed | ResizeStrategy::Auto => {
            let s = shrink_x.max(shrink_y);
            (s, s)
        }
    }
}

/// Kernel for a resize by `hscale x vscale`: the reduction kernel when
/// shrinking, the enlargement interpolator's kernel otherwise.
pub fn kernel_for(hscale: f64, vscale: f64, params: &TransformParams) -> Kernel {
    if hscale > 1.0 && vscale > 1.0 {
        params.interpolator.kernel()
    } else {
        params.reduction_kernel
    }
}

/// A rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub left: i64,
    pub top: i64,
    pub width: u32,
    pub height: u32,
}

fn offset_from_middle(middle: i64, offset: i64) -> i64 {
    let shift = offset.abs().clamp(0, middle.max(0));
    if offset >= 0 { middle + shift } else { middle - shift }
}

/// Crop window for an `image`-sized picture cut down to `target`.
///
/// Returns the window and the target size after clamping to the image, or
/// `None` when the target already covers the image.
pub fn crop_window(image: (u32, u32), target: (u32, u32), offset: (i64, i64), anchor: Anchor) -> Option<(Window, (u32, u32))> {
    let (img_w, img_h) = image;
    let (mut tgt_w, mut tgt_h) = target;
    if tgt_w >= img_w && tgt_h >= img_h {
        return None;
    }

    let (iw, ih, tw, th) = (i64::from(img_w), i64::from(img_h), i64::from(tgt_w), i64::from(tgt_h));
    let mut width = tgt_w.min(img_w);
    let mut height = tgt_h.min(img_h);
    let middle_x = (iw - tw + 1).div_euclid(2);
    let middle_y = (ih - th + 1).div_euclid(2);

    let (left, top) = if offset != (0, 0) {
        (offset_from_middle(middle_x, offset.0), offset_from_middle(middle_y, offset.1))
    } else {
        match anchor {
            Anchor::Top => (middle_x, 0),
            Anchor::Bottom => (middle_x, ih - th),
            Anchor::Left => (0, middle_y),
            Anchor::Right => (iw - tw, middle_y),
            Anchor::TopLeft => (0, 0),
            Anchor::TopRight => (iw - tw, 0),
            Anchor::BottomLeft => (0, ih - th),
            Anchor::BottomRight => (iw - tw, ih - th),
            Anchor::Auto | Anchor::Centre => (middle_x, middle_y),
        }
    };

    let left = left.max(0);
    let top = top.max(0);
    if left + i64::from(width) > iw {
        width = (iw - left) as u32;
        tgt_w = width;
    }
    if top + i64::from(height) > ih {
        height = (ih - top) as u32;
        tgt_h = height;
    }
    Some((
        Window {
            left,
            top,
            width,
            height,
        },
        (tgt_w, tgt_h),
    ))
}

/// Canvas that centres an `image`-sized picture in at least `target`, or
/// `None` when the image already covers the target.
pub fn embed_window(image: (u32, u32), target: (u32, u32)) -> Option<Window> {
    let (img_w, img_h) = image;
    let (tgt_w, tgt_h) = target;
    if tgt_w <= img_w && tgt_h <= img_h {
        return None;
    }
    let (mut left, mut top) = (0, 0);
    let (mut width, mut height) = (img_w, img_h);
    if tgt_w > img_w {
        width = tgt_w;
        left = i64::from(tgt_w - img_w) / 2;
    }
    if tgt_h > img_h {
        height = tgt_h;
        top = i64::from(tgt_h - img_h) / 2;
    }
    Some(Window {
        left,
        top,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Interpolator, Scalar};

    fn sized(width: Scalar, height: Scalar) -> TransformParams {
        TransformParams {
            width,
            height,
            ..Default::default()
        }
    }

    #[test]
    fn ratio_is_exact_for_equal_sides() {
        assert_eq!(ratio(341, 341), 1.0);
        assert_eq!(ratio(50, 100), 0.5);
    }

    #[test]
    fn no_targets_without_dimensions() {
        let targets = resolve_targets((100, 100), &TransformParams::default());
        assert_eq!((targets.width, targets.height, targets.scale), (0, 0, None));
    }

    #[test]
    fn one_dimension_fills_the_other() {
        let t = resolve_targets((2560, 1600), &sized(Scalar::value_of(640.0), Scalar::default()));
        assert_eq!((t.width, t.height), (640, 400));
        let t = resolve_targets((2560, 1600), &sized(Scalar::default(), Scalar::value_of(800.0)));
        assert_eq!((t.width, t.height), (1280, 800));
    }

    #[test]
    fn uniform_relative_scale_is_a_fast_path() {
        let t = resolve_targets((2560, 1600), &sized(Scalar::scale_of(0.25), Scalar::scale_of(0.25)));
        assert_eq!(t.scale, Some(0.25));
        assert_eq!((t.width, t.height), (640, 400));

        let t = resolve_targets((2560, 1600), &sized(Scalar::scale_of(0.5), Scalar::scale_of(0.25)));
        assert_eq!(t.scale, None);
    }

    #[test]
    fn max_scale_caps_targets() {
        let params = TransformParams {
            max_scale: 1.0,
            ..sized(Scalar::value_of(100_000.0), Scalar::value_of(100_000.0))
        };
        let t = resolve_targets((100, 100), &params);
        assert_eq!((t.width, t.height), (100, 100));

        let params = TransformParams {
            max_scale: 2.0,
            ..sized(Scalar::scale_of(3.0), Scalar::scale_of(3.0))
        };
        assert_eq!(resolve_targets((10, 10), &params).scale, Some(2.0));
    }

    #[test]
    fn crop_offsets_are_resolved() {
        let params = TransformParams {
            crop_offset_x: Scalar::scale_of(0.1),
            crop_offset_y: Scalar::value_of(-7.0),
            ..Default::default()
        };
        let t = resolve_targets((200, 100), &params);
        assert_eq!((t.crop_offset_x, t.crop_offset_y), (20, -7));
    }

    #[test]
    fn shrink_unification() {
        assert_eq!(unify_shrink(2.0, 4.0, ResizeStrategy::Crop), (2.0, 2.0));
        assert_eq!(unify_shrink(2.0, 4.0, ResizeStrategy::Embed), (4.0, 4.0));
        assert_eq!(unify_shrink(2.0, 4.0, ResizeStrategy::Auto), (4.0, 4.0));
        assert_eq!(unify_shrink(2.0, 4.0, ResizeStrategy::Stretch), (2.0, 4.0));
    }

    #[test]
    fn enlargement_uses_interpolator() {
        let params = TransformParams {
            interpolator: Interpolator::Nearest,
            reduction_kernel: Kernel::Mitchell,
            ..Default::default()
        };
        assert_eq!(kernel_for(2.0, 2.0, &params), Kernel::Nearest);
        assert_eq!(kernel_for(0.5, 0.5, &params), Kernel::Mitchell);
        assert_eq!(kernel_for(2.0, 0.5, &params), Kernel::Mitchell);
    }

    #[test]
    fn crop_anchors() {
        let centre = crop_window((200, 100), (100, 50), (0, 0), Anchor::Auto).unwrap().0;
        assert_eq!((centre.left, centre.top), (50, 25));
        let br = crop_window((200, 100), (100, 50), (0, 0), Anchor::BottomRight).unwrap().0;
        assert_eq!((br.left, br.top, br.width, br.height), (100, 50, 100, 50));
        let top = crop_window((200, 100), (100, 50), (0, 0), Anchor::Top).unwrap().0;
        assert_eq!((top.left, top.top), (50, 0));
        let left = crop_window((200, 100), (100, 50), (0, 0), Anchor::Left).unwrap().0;
        assert_eq!((left.left, left.top), (0, 25));
    }

    #[test]
    fn crop_offsets_clamp_to_middle() {
        let (w, _) = crop_window((200, 100), (100, 50), (1000, -1000), Anchor::Auto).unwrap();
        assert_eq!((w.left, w.top), (100, 0));
        let (w, _) = crop_window((200, 100), (100, 50), (-10, 5), Anchor::BottomRight).unwrap();
        assert_eq!((w.left, w.top), (40, 30));
    }

    #[test]
    fn crop_skipped_when_target_covers_image() {
        assert!(crop_window((100, 100), (100, 120), (0, 0), Anchor::Auto).is_none());
    }

    #[test]
    fn crop_clamps_oversized_target() {
        let (w, target) = crop_window((150, 100), (200, 50), (0, 0), Anchor::Auto).unwrap();
        assert_eq!((w.left, w.width), (0, 150));
        assert_eq!(target, (200, 50));
        assert_eq!((w.top, w.height), (25, 50));
    }

    #[test]
    fn embed_centres() {
        let w = embed_window((100, 100), (200, 150)).unwrap();
        assert_eq!((w.left, w.top, w.width, w.height), (50, 25, 200, 150));
        let w = embed_window((150, 100), (100, 150)).unwrap();
        assert_eq!((w.left, w.top, w.width, w.height), (0, 25, 150, 150));
        assert!(embed_window((100, 100), (100, 100)).is_none());
    }
}
