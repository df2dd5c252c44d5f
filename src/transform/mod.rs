//! Declarative transform facade.
//!
//! A [`Transform`] collects transform intent ([`TransformParams`]), export
//! settings ([`ExportParams`]) and optional input/output plumbing, then runs
//! the planner in [`blackboard`] against an image:
//!
//! ```no_run
//! use pixform::{ImageType, Transform};
//!
//! let (bytes, meta) = Transform::new()
//!     .load_file("photo.jpg")
//!     .resize(640, 400)
//!     .crop(pixform::Anchor::Centre)
//!     .format(ImageType::Webp)
//!     .output_file("photo.webp")
//!     .run()?;
//! # Ok::<(), pixform::Error>(())
//! ```
//!
//! Every terminal method starts the runtime if needed and releases the
//! calling thread's engine state when it returns.

mod blackboard;
pub mod calculations;

use crate::error::{Error, Result};
use crate::foreign::ImageMetadata;
use crate::image::ImageRef;
use crate::logging::log_debug;
use crate::params::{ExportParams, ImportParams, LabelParams, Quality, Sharpening, TransformParams};
use crate::registry::ImageType;
use crate::runtime;
use crate::types::{Anchor, Angle, Color, Extend, FlipDirection, Interpolator, Interpretation, Kernel, ResizeStrategy, Scalar};
use blackboard::Blackboard;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

/// Where [`Transform::run`] reads from.
enum Input {
    /// Opened when the transform runs.
    File(PathBuf),
    Buffer(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

/// Where [`Transform::run`] writes to, besides returning the bytes.
enum Output {
    Bytes,
    /// Created when the transform runs.
    File(PathBuf),
    Writer(Box<dyn Write + Send>),
}

/// Releases the calling thread's engine state on drop.
struct ThreadRelease;

impl Drop for ThreadRelease {
    fn drop(&mut self) {
        runtime::shutdown_thread();
    }
}

/// Builder for a single image transformation.
pub struct Transform {
    params: TransformParams,
    export: ExportParams,
    import: ImportParams,
    input: Option<Input>,
    output: Output,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    pub fn new() -> Self {
        Self {
            params: TransformParams::default(),
            export: ExportParams::default(),
            import: ImportParams::default(),
            input: None,
            output: Output::Bytes,
        }
    }

    /// Start from explicit parameter records.
    pub fn with_params(params: TransformParams, export: ExportParams) -> Self {
        Self {
            params,
            export,
            ..Self::new()
        }
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }

    pub fn export_params(&self) -> &ExportParams {
        &self.export
    }

    // ---- input / output -------------------------------------------------

    /// Read the input from `path` when the transform runs.
    pub fn load_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(Input::File(path.into()));
        self
    }

    pub fn load_buffer(mut self, buf: impl Into<Vec<u8>>) -> Self {
        self.input = Some(Input::Buffer(buf.into()));
        self
    }

    /// Read the input from `reader`. The reader is drained once.
    pub fn load(mut self, reader: impl Read + Send + 'static) -> Self {
        self.input = Some(Input::Reader(Box::new(reader)));
        self
    }

    pub fn import_params(mut self, params: ImportParams) -> Self {
        self.import = params;
        self
    }

    /// Write the encoded output to `writer` as well as returning it.
    pub fn output(mut self, writer: impl Write + Send + 'static) -> Self {
        self.output = Output::Writer(Box::new(writer));
        self
    }

    /// Create `path` and write the encoded output to it when the transform runs.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Output::File(path.into());
        self
    }

    /// Only return the encoded bytes.
    pub fn output_bytes(mut self) -> Self {
        self.output = Output::Bytes;
        self
    }

    // ---- geometry -------------------------------------------------------

    /// Resize to `width x height`, reconciled by the resize strategy.
    pub fn resize(mut self, width: u32, height: u32) -> Self {
        self.params.width = Scalar::value_of(f64::from(width));
        self.params.height = Scalar::value_of(f64::from(height));
        self
    }

    /// Resize to `width`, keeping the aspect ratio.
    pub fn resize_width(mut self, width: u32) -> Self {
        self.params.width = Scalar::value_of(f64::from(width));
        self
    }

    pub fn resize_height(mut self, height: u32) -> Self {
        self.params.height = Scalar::value_of(f64::from(height));
        self
    }

    /// Scale both dimensions by `scale`.
    pub fn scale(mut self, scale: f64) -> Self {
        self.params.width = Scalar::scale_of(scale);
        self.params.height = Scalar::scale_of(scale);
        self
    }

    pub fn scale_width(mut self, scale: f64) -> Self {
        self.params.width = Scalar::scale_of(scale);
        self
    }

    pub fn scale_height(mut self, scale: f64) -> Self {
        self.params.height = Scalar::scale_of(scale);
        self
    }

    /// Never scale by more than `max` relative to the source.
    pub fn max_scale(mut self, max: f64) -> Self {
        self.params.max_scale = max;
        self
    }

    pub fn resize_strategy(mut self, strategy: ResizeStrategy) -> Self {
        self.params.resize_strategy = strategy;
        self
    }

    /// Fit inside the target and pad the rest with `extend`.
    pub fn embed(mut self, extend: Extend) -> Self {
        self.params.resize_strategy = ResizeStrategy::Embed;
        self.params.pad_strategy = extend;
        self
    }

    /// Fill the target and cut the overflow at `anchor`.
    pub fn crop(mut self, anchor: Anchor) -> Self {
        self.params.resize_strategy = ResizeStrategy::Crop;
        self.params.crop_anchor = anchor;
        self
    }

    /// Resize to exactly the target, ignoring the aspect ratio.
    pub fn stretch(mut self) -> Self {
        self.params.resize_strategy = ResizeStrategy::Stretch;
        self
    }

    pub fn pad_strategy(mut self, extend: Extend) -> Self {
        self.params.pad_strategy = extend;
        self
    }

    /// Fill colour for [`Extend::Background`] padding.
    pub fn background(mut self, colour: Color) -> Self {
        self.params.background = colour;
        self
    }

    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.params.crop_anchor = anchor;
        self
    }

    /// Shift the crop window from the middle by `x` pixels.
    pub fn crop_offset_x(mut self, x: i64) -> Self {
        self.params.crop_offset_x = Scalar::value_of(x as f64);
        self
    }

    pub fn crop_offset_y(mut self, y: i64) -> Self {
        self.params.crop_offset_y = Scalar::value_of(y as f64);
        self
    }

    /// Shift the crop window by a fraction of the source width.
    pub fn crop_relative_offset_x(mut self, x: f64) -> Self {
        self.params.crop_offset_x = Scalar::scale_of(x);
        self
    }

    pub fn crop_relative_offset_y(mut self, y: f64) -> Self {
        self.params.crop_offset_y = Scalar::scale_of(y);
        self
    }

    /// Kernel used when shrinking. Defaults to lanczos3.
    pub fn kernel(mut self, kernel: Kernel) -> Self {
        self.params.reduction_kernel = kernel;
        self
    }

    /// Interpolator used when enlarging. Defaults to bicubic.
    pub fn interpolator(mut self, interpolator: Interpolator) -> Self {
        self.params.interpolator = interpolator;
        self
    }

    // ---- post-processing ------------------------------------------------

    /// Repeat each pixel `x` times horizontally and `y` times vertically.
    pub fn zoom(mut self, x: u32, y: u32) -> Self {
        self.params.zoom_x = x;
        self.params.zoom_y = y;
        self
    }

    pub fn flip(mut self, flip: FlipDirection) -> Self {
        self.params.flip = flip;
        self
    }

    pub fn invert(mut self) -> Self {
        self.params.invert = true;
        self
    }

    pub fn gaussian_blur(mut self, sigma: f64) -> Self {
        self.params.blur_sigma = sigma;
        self
    }

    pub fn sharpen(mut self, sharpening: Sharpening) -> Self {
        self.params.sharpen = Some(sharpening);
        self
    }

    pub fn auto_rotate(mut self) -> Self {
        self.params.auto_rotate = true;
        self
    }

    /// Rotate clockwise, after auto-rotation.
    pub fn rotate(mut self, angle: Angle) -> Self {
        self.params.rotate = angle;
        self
    }

    /// Overlay text. Empty text removes a previously set label.
    pub fn label(mut self, label: &LabelParams) -> Self {
        self.params.label = if label.text.is_empty() {
            None
        } else {
            Some(label.with_defaults())
        };
        self
    }

    // ---- export ---------------------------------------------------------

    /// Output format; unknown keeps the input's format.
    pub fn format(mut self, format: ImageType) -> Self {
        self.export.format = format;
        self
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.export.quality = Some(Quality::new(quality));
        self
    }

    pub fn compression(mut self, compression: u8) -> Self {
        self.export.compression = Some(compression);
        self
    }

    pub fn lossless(mut self) -> Self {
        self.export.lossless = true;
        self
    }

    pub fn interlaced(mut self) -> Self {
        self.export.interlaced = true;
        self
    }

    pub fn strip_metadata(mut self) -> Self {
        self.export.strip_metadata = true;
        self
    }

    pub fn strip_profile(mut self) -> Self {
        self.export.strip_profile = true;
        self
    }

    /// Flatten transparency against `colour` when exporting.
    pub fn background_color(mut self, colour: Color) -> Self {
        self.export.background = Some(colour);
        self
    }

    pub fn interpretation(mut self, interpretation: Interpretation) -> Self {
        self.export.interpretation = Some(interpretation);
        self
    }

    // ---- terminal -------------------------------------------------------

    /// Transform a copy of `image`; the input handle is left as it was.
    pub fn apply(&self, image: &ImageRef) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let _release = ThreadRelease;
        self.transform(image.copy()?)
    }

    /// Transform a copy of `image` and encode the result.
    pub fn apply_and_export(&self, image: &ImageRef) -> Result<(Vec<u8>, ImageMetadata)> {
        runtime::startup_if_needed();
        let _release = ThreadRelease;
        let transformed = self.transform(image.copy()?)?;
        transformed.export(&self.export)
    }

    /// Load the configured input, transform, encode and write the output.
    ///
    /// The input is consumed; a second run without a new input fails with
    /// [`Error::InvalidArgument`].
    pub fn run(&mut self) -> Result<(Vec<u8>, ImageMetadata)> {
        runtime::startup_if_needed();
        let _release = ThreadRelease;

        let image = match self.input.take() {
            Some(Input::File(path)) => ImageRef::new_from_file(&path, Some(&self.import))?,
            Some(Input::Buffer(buf)) => ImageRef::new_from_buffer(&buf, Some(&self.import))?,
            Some(Input::Reader(reader)) => ImageRef::new_from_reader(reader, Some(&self.import))?,
            None => return Err(Error::invalid("transform: no input image")),
        };
        let transformed = self.transform(image)?;
        let (bytes, metadata) = transformed.export(&self.export)?;
        self.write_output(&bytes)?;
        Ok((bytes, metadata))
    }

    fn transform(&self, mut image: ImageRef) -> Result<ImageRef> {
        let source = (image.width(), image.height());
        Blackboard::new(source, &self.params).run(&mut image)?;
        log_debug!(
            "transform: {}x{} -> {}x{}",
            source.0,
            source.1,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn write_output(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.output {
            Output::Bytes => Ok(()),
            Output::File(path) => {
                let mut file = BufWriter::new(File::create(&*path)?);
                file.write_all(bytes)?;
                file.flush()?;
                Ok(())
            }
            Output::Writer(writer) => {
                writer.write_all(bytes)?;
                writer.flush()?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use crate::test_helpers::{encode_rgb, ensure_started, gradient_rgb};
    use image::ImageFormat;
    use std::sync::{Arc, Mutex};

    /// Writer that hands its bytes back to the test.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builder_sets_params() {
        let t = Transform::new()
            .resize(100, 50)
            .crop(Anchor::TopLeft)
            .kernel(Kernel::Mitchell)
            .flip(FlipDirection::Vertical)
            .quality(70)
            .format(ImageType::Png);
        assert_eq!(t.params().width, Scalar::value_of(100.0));
        assert_eq!(t.params().resize_strategy, ResizeStrategy::Crop);
        assert_eq!(t.params().crop_anchor, Anchor::TopLeft);
        assert_eq!(t.params().reduction_kernel, Kernel::Mitchell);
        assert_eq!(t.export_params().quality, Some(Quality::new(70)));
        assert_eq!(t.export_params().format, ImageType::Png);

        assert_eq!(Transform::new().stretch().params().resize_strategy, ResizeStrategy::Stretch);
        let embed = Transform::new().embed(Extend::Mirror);
        assert_eq!(embed.params().pad_strategy, Extend::Mirror);
    }

    #[test]
    fn label_defaults_are_filled() {
        let t = Transform::new().label(&LabelParams {
            text: "x".into(),
            opacity: 0.0,
            font: String::new(),
            ..Default::default()
        });
        let label = t.params().label.as_ref().unwrap();
        assert_eq!(label.opacity, 1.0);
        assert_eq!(label.font, crate::params::DEFAULT_FONT);
        assert!(Transform::new().label(&LabelParams::default()).params().label.is_none());
    }

    #[test]
    fn apply_leaves_input_alone() {
        ensure_started();
        let png = encode_rgb(&gradient_rgb(80, 40), ImageFormat::Png);
        let image = ImageRef::new_from_buffer(&png, None).unwrap();
        let out = Transform::new().resize_width(40).apply(&image).unwrap();
        assert_eq!((out.width(), out.height()), (40, 20));
        assert_eq!((image.width(), image.height()), (80, 40));
    }

    #[test]
    fn run_writes_to_writer() {
        ensure_started();
        let sink = SharedSink::default();
        let png = encode_rgb(&gradient_rgb(64, 32), ImageFormat::Png);
        let mut t = Transform::new().load_buffer(png).scale(0.5).output(sink.clone());
        let (bytes, meta) = t.run().unwrap();
        assert_eq!((meta.width, meta.height), (32, 16));
        assert_eq!(meta.format, ImageType::Png);
        assert_eq!(*sink.0.lock().unwrap(), bytes);

        assert!(matches!(t.run(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn run_writes_file_lazily() {
        ensure_started();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jpg");
        let output = dir.path().join("out.png");
        std::fs::write(&input, encode_rgb(&gradient_rgb(30, 20), ImageFormat::Jpeg)).unwrap();

        let mut t = Transform::new()
            .load_file(&input)
            .format(ImageType::Png)
            .output_file(&output);
        assert!(!output.exists());
        t.run().unwrap();
        let written = std::fs::read(&output).unwrap();
        assert_eq!(registry::sniff(&written), ImageType::Png);
    }
}
