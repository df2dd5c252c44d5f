//! The transform planner.
//!
//! A [`Blackboard`] holds the targets resolved from the source size and
//! drives a [`TransformTarget`] through resize, crop, embed and the fixed
//! post-processing sequence:
//!
//! | Step | Runs when |
//! |------|-----------|
//! | zoom | either factor > 0 |
//! | flip | direction is not `None`; `Both` flips horizontally first |
//! | invert | flag set |
//! | gaussian blur | sigma > 0 |
//! | sharpen | sharpening set with sigma > 0 |
//! | auto-rotate | flag set |
//! | rotate | angle is not 0 |
//! | label | label set with non-empty text |

use super::calculations::{self, Targets};
use crate::error::Result;
use crate::image::ImageRef;
use crate::logging::log_debug;
use crate::params::{LabelParams, Sharpening, TransformParams};
use crate::types::{Angle, Color, Direction, Extend, FlipDirection, Kernel, ResizeStrategy};

/// What the planner needs from an image.
///
/// [`ImageRef`] is the production implementation; tests substitute a
/// recorder that tracks only the size.
pub(crate) trait TransformTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn resize(&mut self, hscale: f64, vscale: f64, kernel: Kernel) -> Result<()>;
    fn extract_area(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<()>;
    fn embed(&mut self, left: i32, top: i32, width: u32, height: u32, extend: Extend, background: Color) -> Result<()>;
    fn zoom(&mut self, xfac: u32, yfac: u32) -> Result<()>;
    fn flip(&mut self, direction: Direction) -> Result<()>;
    fn invert(&mut self) -> Result<()>;
    fn gaussian_blur(&mut self, sigma: f64) -> Result<()>;
    fn sharpen(&mut self, sharpening: &Sharpening) -> Result<()>;
    fn auto_rotate(&mut self) -> Result<()>;
    fn rotate(&mut self, angle: Angle) -> Result<()>;
    fn label(&mut self, params: &LabelParams) -> Result<()>;
}

impl TransformTarget for ImageRef {
    fn width(&self) -> u32 {
        ImageRef::width(self)
    }

    fn height(&self) -> u32 {
        ImageRef::height(self)
    }

    fn resize(&mut self, hscale: f64, vscale: f64, kernel: Kernel) -> Result<()> {
        self.resize_with_vscale(hscale, vscale, kernel)
    }

    fn extract_area(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<()> {
        ImageRef::extract_area(self, left, top, width, height)
    }

    fn embed(&mut self, left: i32, top: i32, width: u32, height: u32, extend: Extend, background: Color) -> Result<()> {
        match extend {
            Extend::Background => self.embed_background(left, top, width, height, background),
            _ => ImageRef::embed(self, left, top, width, height, extend),
        }
    }

    fn zoom(&mut self, xfac: u32, yfac: u32) -> Result<()> {
        ImageRef::zoom(self, xfac, yfac)
    }

    fn flip(&mut self, direction: Direction) -> Result<()> {
        ImageRef::flip(self, direction)
    }

    fn invert(&mut self) -> Result<()> {
        ImageRef::invert(self)
    }

    fn gaussian_blur(&mut self, sigma: f64) -> Result<()> {
        ImageRef::gaussian_blur(self, sigma)
    }

    fn sharpen(&mut self, sharpening: &Sharpening) -> Result<()> {
        ImageRef::sharpen(self, sharpening.sigma, sharpening.x1, sharpening.m2)
    }

    fn auto_rotate(&mut self) -> Result<()> {
        ImageRef::auto_rotate(self)
    }

    fn rotate(&mut self, angle: Angle) -> Result<()> {
        ImageRef::rotate(self, angle)
    }

    fn label(&mut self, params: &LabelParams) -> Result<()> {
        ImageRef::label(self, params)
    }
}

/// Transient planner state for one transform.
#[derive(Debug)]
pub(crate) struct Blackboard<'a> {
    params: &'a TransformParams,
    targets: Targets,
}

impl<'a> Blackboard<'a> {
    pub(crate) fn new(source: (u32, u32), params: &'a TransformParams) -> Self {
        let targets = calculations::resolve_targets(source, params);
        log_debug!(
            "plan: {}x{} -> {}x{} (scale {:?}, {:?})",
            source.0,
            source.1,
            targets.width,
            targets.height,
            targets.scale,
            params.resize_strategy
        );
        Self { params, targets }
    }

    /// Run the whole plan against `image`.
    pub(crate) fn run(&mut self, image: &mut impl TransformTarget) -> Result<()> {
        self.resize(image)?;
        self.post_process(image)
    }

    fn resize(&mut self, image: &mut impl TransformTarget) -> Result<()> {
        if let Some(scale) = self.targets.scale {
            let kernel = calculations::kernel_for(scale, scale, self.params);
            return image.resize(scale, scale, kernel);
        }
        if self.targets.width == 0 && self.targets.height == 0 {
            return Ok(());
        }

        let strategy = self.params.resize_strategy;
        let (shrink_x, shrink_y) = calculations::unify_shrink(
            calculations::ratio(image.width(), self.targets.width),
            calculations::ratio(image.height(), self.targets.height),
            strategy,
        );
        if shrink_x != 1.0 || shrink_y != 1.0 {
            let (hscale, vscale) = (1.0 / shrink_x, 1.0 / shrink_y);
            image.resize(hscale, vscale, calculations::kernel_for(hscale, vscale, self.params))?;
            if strategy == ResizeStrategy::Stretch {
                return Ok(());
            }
        }

        if strategy == ResizeStrategy::Crop {
            self.crop(image)?;
        }
        self.embed(image)
    }

    fn crop(&mut self, image: &mut impl TransformTarget) -> Result<()> {
        let Some((window, target)) = calculations::crop_window(
            (image.width(), image.height()),
            (self.targets.width, self.targets.height),
            (self.targets.crop_offset_x, self.targets.crop_offset_y),
            self.params.crop_anchor,
        ) else {
            return Ok(());
        };
        (self.targets.width, self.targets.height) = target;
        image.extract_area(window.left as u32, window.top as u32, window.width, window.height)
    }

    fn embed(&mut self, image: &mut impl TransformTarget) -> Result<()> {
        let Some(window) = calculations::embed_window(
            (image.width(), image.height()),
            (self.targets.width, self.targets.height),
        ) else {
            return Ok(());
        };
        image.embed(
            window.left as i32,
            window.top as i32,
            window.width,
            window.height,
            self.params.pad_strategy,
            self.params.background,
        )
    }

    fn post_process(&self, image: &mut impl TransformTarget) -> Result<()> {
        let p = self.params;
        if p.zoom_x > 0 || p.zoom_y > 0 {
            image.zoom(p.zoom_x.max(1), p.zoom_y.max(1))?;
        }

        match p.flip {
            FlipDirection::None => {}
            FlipDirection::Horizontal => image.flip(Direction::Horizontal)?,
            FlipDirection::Vertical => image.flip(Direction::Vertical)?,
            FlipDirection::Both => {
                image.flip(Direction::Horizontal)?;
                image.flip(Direction::Vertical)?;
            }
        }

        if p.invert {
            image.invert()?;
        }
        if p.blur_sigma > 0.0 {
            image.gaussian_blur(p.blur_sigma)?;
        }
        if let Some(sharpening) = p.sharpen.as_ref().filter(|s| s.sigma > 0.0) {
            image.sharpen(sharpening)?;
        }
        if p.auto_rotate {
            image.auto_rotate()?;
        }
        if p.rotate != Angle::D0 {
            image.rotate(p.rotate)?;
        }
        if let Some(label) = p.label.as_ref().filter(|l| !l.text.is_empty()) {
            image.label(label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Anchor, Scalar};

    /// Planner target that records operations and tracks only the size.
    pub(crate) struct RecordingTarget {
        pub width: u32,
        pub height: u32,
        pub operations: Vec<RecordedOp>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum RecordedOp {
        Resize { hscale: f64, vscale: f64, kernel: Kernel },
        ExtractArea { left: u32, top: u32, width: u32, height: u32 },
        Embed { left: i32, top: i32, width: u32, height: u32, extend: Extend },
        Zoom(u32, u32),
        Flip(Direction),
        Invert,
        Blur(f64),
        Sharpen(f64),
        AutoRotate,
        Rotate(Angle),
        Label(String),
    }

    impl RecordingTarget {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                operations: Vec::new(),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.clone()
        }

        fn record(&mut self, op: RecordedOp) {
            self.operations.push(op);
        }
    }

    impl TransformTarget for RecordingTarget {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn resize(&mut self, hscale: f64, vscale: f64, kernel: Kernel) -> Result<()> {
            self.width = ((f64::from(self.width) * hscale).round() as u32).max(1);
            self.height = ((f64::from(self.height) * vscale).round() as u32).max(1);
            self.record(RecordedOp::Resize { hscale, vscale, kernel });
            Ok(())
        }

        fn extract_area(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<()> {
            assert!(left + width <= self.width && top + height <= self.height, "crop outside image");
            (self.width, self.height) = (width, height);
            self.record(RecordedOp::ExtractArea { left, top, width, height });
            Ok(())
        }

        fn embed(&mut self, left: i32, top: i32, width: u32, height: u32, extend: Extend, _: Color) -> Result<()> {
            (self.width, self.height) = (width, height);
            self.record(RecordedOp::Embed {
                left,
                top,
                width,
                height,
                extend,
            });
            Ok(())
        }

        fn zoom(&mut self, xfac: u32, yfac: u32) -> Result<()> {
            self.width *= xfac;
            self.height *= yfac;
            self.record(RecordedOp::Zoom(xfac, yfac));
            Ok(())
        }

        fn flip(&mut self, direction: Direction) -> Result<()> {
            self.record(RecordedOp::Flip(direction));
            Ok(())
        }

        fn invert(&mut self) -> Result<()> {
            self.record(RecordedOp::Invert);
            Ok(())
        }

        fn gaussian_blur(&mut self, sigma: f64) -> Result<()> {
            self.record(RecordedOp::Blur(sigma));
            Ok(())
        }

        fn sharpen(&mut self, sharpening: &Sharpening) -> Result<()> {
            self.record(RecordedOp::Sharpen(sharpening.sigma));
            Ok(())
        }

        fn auto_rotate(&mut self) -> Result<()> {
            self.record(RecordedOp::AutoRotate);
            Ok(())
        }

        fn rotate(&mut self, angle: Angle) -> Result<()> {
            if matches!(angle, Angle::D90 | Angle::D270) {
                (self.width, self.height) = (self.height, self.width);
            }
            self.record(RecordedOp::Rotate(angle));
            Ok(())
        }

        fn label(&mut self, params: &LabelParams) -> Result<()> {
            self.record(RecordedOp::Label(params.text.clone()));
            Ok(())
        }
    }

    fn plan(source: (u32, u32), params: &TransformParams) -> RecordingTarget {
        let mut target = RecordingTarget::new(source.0, source.1);
        Blackboard::new(source, params).run(&mut target).unwrap();
        target
    }

    fn sized(width: f64, height: f64, strategy: ResizeStrategy) -> TransformParams {
        TransformParams {
            width: Scalar::value_of(width),
            height: Scalar::value_of(height),
            resize_strategy: strategy,
            ..Default::default()
        }
    }

    #[test]
    fn empty_transform_does_nothing() {
        let target = plan((640, 480), &TransformParams::default());
        assert!(target.get_operations().is_empty());
        assert_eq!((target.width, target.height), (640, 480));
    }

    #[test]
    fn uniform_scale_is_one_resize() {
        let params = TransformParams {
            width: Scalar::scale_of(0.25),
            height: Scalar::scale_of(0.25),
            ..Default::default()
        };
        let target = plan((2560, 1600), &params);
        assert_eq!(
            target.get_operations(),
            vec![RecordedOp::Resize {
                hscale: 0.25,
                vscale: 0.25,
                kernel: Kernel::Lanczos3
            }]
        );
        assert_eq!((target.width, target.height), (640, 400));
    }

    #[test]
    fn embed_fits_then_pads() {
        let target = plan((400, 200), &sized(200.0, 200.0, ResizeStrategy::Embed));
        let ops = target.get_operations();
        assert_eq!(
            ops[0],
            RecordedOp::Resize {
                hscale: 0.5,
                vscale: 0.5,
                kernel: Kernel::Lanczos3
            }
        );
        assert_eq!(
            ops[1],
            RecordedOp::Embed {
                left: 0,
                top: 50,
                width: 200,
                height: 200,
                extend: Extend::Black
            }
        );
    }

    #[test]
    fn embed_enlarges_then_centres() {
        let target = plan((100, 100), &sized(200.0, 150.0, ResizeStrategy::Embed));
        assert!(target.width >= 200 && target.height >= 150);
        let embed = target
            .get_operations()
            .into_iter()
            .find(|op| matches!(op, RecordedOp::Embed { .. }))
            .unwrap();
        // Enlarged by 1.5 to 150x150, then centred horizontally
        assert_eq!(
            embed,
            RecordedOp::Embed {
                left: 25,
                top: 0,
                width: 200,
                height: 150,
                extend: Extend::Black
            }
        );
    }

    #[test]
    fn crop_fills_then_cuts() {
        let params = TransformParams {
            crop_anchor: Anchor::BottomRight,
            ..sized(100.0, 100.0, ResizeStrategy::Crop)
        };
        let target = plan((400, 200), &params);
        assert_eq!(
            target.get_operations(),
            vec![
                RecordedOp::Resize {
                    hscale: 0.5,
                    vscale: 0.5,
                    kernel: Kernel::Lanczos3
                },
                RecordedOp::ExtractArea {
                    left: 100,
                    top: 0,
                    width: 100,
                    height: 100
                },
            ]
        );
    }

    #[test]
    fn crop_at_source_size_keeps_pixels() {
        let params = TransformParams {
            crop_anchor: Anchor::BottomRight,
            ..sized(341.0, 256.0, ResizeStrategy::Crop)
        };
        let target = plan((341, 256), &params);
        assert!(target.get_operations().is_empty());
        assert_eq!((target.width, target.height), (341, 256));
    }

    #[test]
    fn stretch_ignores_aspect() {
        let target = plan((400, 200), &sized(100.0, 100.0, ResizeStrategy::Stretch));
        assert_eq!((target.width, target.height), (100, 100));
        assert_eq!(target.get_operations().len(), 1);
    }

    #[test]
    fn max_scale_prevents_enlargement() {
        let params = TransformParams {
            max_scale: 1.0,
            ..sized(100_000.0, 100_000.0, ResizeStrategy::Auto)
        };
        let target = plan((100, 100), &params);
        assert_eq!((target.width, target.height), (100, 100));
        assert!(target.get_operations().is_empty());
    }

    #[test]
    fn post_processing_order() {
        let params = TransformParams {
            zoom_x: 2,
            flip: FlipDirection::Both,
            invert: true,
            blur_sigma: 1.5,
            sharpen: Some(Sharpening::light()),
            auto_rotate: true,
            rotate: Angle::D90,
            label: Some(LabelParams {
                text: "hi".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let target = plan((10, 20), &params);
        assert_eq!(
            target.get_operations(),
            vec![
                RecordedOp::Zoom(2, 1),
                RecordedOp::Flip(Direction::Horizontal),
                RecordedOp::Flip(Direction::Vertical),
                RecordedOp::Invert,
                RecordedOp::Blur(1.5),
                RecordedOp::Sharpen(0.5),
                RecordedOp::AutoRotate,
                RecordedOp::Rotate(Angle::D90),
                RecordedOp::Label("hi".into()),
            ]
        );
        assert_eq!((target.width, target.height), (20, 20));
    }

    #[test]
    fn monotone_fit_properties() {
        for (sw, sh) in [(640, 480), (480, 640), (333, 77), (1000, 1000)] {
            for (tw, th) in [(100, 100), (320, 50), (17, 300)] {
                let embed = plan((sw, sh), &sized(tw as f64, th as f64, ResizeStrategy::Embed));
                assert!(embed.width >= tw && embed.height >= th, "embed {sw}x{sh} -> {tw}x{th}");

                let crop = plan((sw, sh), &sized(tw as f64, th as f64, ResizeStrategy::Crop));
                assert_eq!((crop.width, crop.height), (tw, th), "crop {sw}x{sh} -> {tw}x{th}");

                let stretch = plan((sw, sh), &sized(tw as f64, th as f64, ResizeStrategy::Stretch));
                assert_eq!((stretch.width, stretch.height), (tw, th), "stretch {sw}x{sh} -> {tw}x{th}");
            }
        }
    }
}
