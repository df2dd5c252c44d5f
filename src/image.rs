//! The image handle.
//!
//! An [`ImageRef`] owns exactly one native image and swaps it for a new one on
//! every successful operation. Failed operations leave the handle untouched.
//! Native images are immutable and reference counted, so a swap never
//! disturbs other handles or cache entries that share the previous image.
//!
//! Mutating operations take `&mut self`; sharing one handle across threads
//! needs an external lock, while different handles are independent.

use crate::engine::{
    self, RawImage, arithmetic::{self, BinaryOp}, colour, conversion, convolution, create,
    draw::{self, Label}, resample::{self, Similarity},
};
use crate::error::{Error, Result};
use crate::foreign::{self, ImageMetadata};
use crate::logging::{log_debug, log_warn};
use crate::params::{
    ExportParams, GifExportParams, HeifExportParams, ImportParams, JpegExportParams, LabelParams,
    PngExportParams, TiffExportParams, WebpExportParams,
};
use crate::registry::{self, ImageType};
use crate::runtime;
use crate::stream::{Source, Target};
use crate::types::{
    Angle, BandFormat, BlendMode, Coding, Color, ColorRGBA, Direction, Extend, Interesting,
    Interpolator, Interpretation, Kernel, Size,
};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// One layer of [`ImageRef::composite_multi`].
#[derive(Clone, Copy)]
pub struct ImageComposite<'a> {
    pub image: &'a ImageRef,
    pub mode: BlendMode,
    pub x: i32,
    pub y: i32,
}

/// A handle to a decoded or synthesised image.
pub struct ImageRef {
    image: Option<Arc<RawImage>>,
    format: ImageType,
    /// Encoded bytes the image was decoded from, kept until close.
    source: Option<Arc<[u8]>>,
    /// Band format before premultiplication, set while premultiplied.
    premultiplied: Option<BandFormat>,
}

/// Rotation and mirror that bring an EXIF orientation upright.
fn orientation_transform(orientation: u16) -> (Angle, bool) {
    match orientation {
        2 => (Angle::D0, true),
        3 => (Angle::D180, false),
        4 => (Angle::D180, true),
        5 => (Angle::D90, true),
        6 => (Angle::D90, false),
        7 => (Angle::D270, true),
        8 => (Angle::D270, false),
        _ => (Angle::D0, false),
    }
}

/// Per-band fill values for an 8-bit colour in `image`'s sample range.
fn fill_values(image: &RawImage, colour: ColorRGBA) -> Vec<f64> {
    let scale = f64::from(image.max_alpha()) / 255.0;
    let rgb = [colour.r, colour.g, colour.b].map(|c| f64::from(c) * scale);
    let mut values = match image.colour_bands() {
        1 => vec![0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]],
        n => {
            let mut v = rgb.to_vec();
            v.resize(n as usize, 0.0);
            v
        }
    };
    if image.has_alpha() {
        values.push(f64::from(colour.a) * scale);
    }
    values
}

fn with_meta(image: &RawImage, edit: impl FnOnce(&mut engine::Metadata)) -> Arc<RawImage> {
    let mut copy = image.duplicate();
    edit(&mut copy.meta);
    Arc::new(copy)
}

impl ImageRef {
    pub(crate) fn from_raw(image: Arc<RawImage>, format: ImageType, source: Option<Arc<[u8]>>) -> ImageRef {
        ImageRef {
            image: Some(image),
            format,
            source,
            premultiplied: None,
        }
    }

    fn from_loaded(loaded: foreign::Loaded, params: &ImportParams) -> Result<ImageRef> {
        let mut image = ImageRef::from_raw(loaded.image, loaded.format, loaded.source);
        if params.auto_rotate == Some(true) {
            image.auto_rotate()?;
        }
        Ok(image)
    }

    // =====================================================================
    // Constructors
    // =====================================================================

    /// Decode a file. Starts the runtime if needed.
    pub fn new_from_file(path: impl AsRef<Path>, params: Option<&ImportParams>) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let params = params.copied().unwrap_or_default();
        let loaded = foreign::load_file(path.as_ref(), &params)?;
        ImageRef::from_loaded(loaded, &params)
    }

    /// Decode an in-memory buffer. The bytes are copied and retained.
    pub fn new_from_buffer(buf: &[u8], params: Option<&ImportParams>) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let params = params.copied().unwrap_or_default();
        let loaded = foreign::load_buffer(Arc::from(buf), &params)?;
        ImageRef::from_loaded(loaded, &params)
    }

    /// Drain `reader` and decode what it produced.
    pub fn new_from_reader(mut reader: impl Read, params: Option<&ImportParams>) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let params = params.copied().unwrap_or_default();
        let loaded = foreign::load_buffer(Arc::from(buf), &params)?;
        ImageRef::from_loaded(loaded, &params)
    }

    /// Decode everything `source` yields.
    pub fn new_from_source(source: &Source, params: Option<&ImportParams>) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let params = params.copied().unwrap_or_default();
        let buf = source.read_to_end()?;
        let loaded = foreign::load_buffer(Arc::from(buf), &params)?;
        ImageRef::from_loaded(loaded, &params)
    }

    /// A one-band all-zero image.
    pub fn black(width: u32, height: u32) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let image = engine::call_uncached("black", || create::black(width, height, 1))?;
        Ok(ImageRef::from_raw(Arc::new(image), ImageType::Unknown, None))
    }

    /// A two-band image holding each pixel's coordinates.
    pub fn xyz(width: u32, height: u32) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let image = engine::call_uncached("xyz", || create::xyz(width, height))?;
        Ok(ImageRef::from_raw(Arc::new(image), ImageType::Unknown, None))
    }

    /// An identity lookup table, 8-bit or (with `ushort`) 16-bit.
    pub fn identity(ushort: bool) -> Result<ImageRef> {
        runtime::startup_if_needed();
        let image = engine::call_uncached("identity", || create::identity(ushort))?;
        Ok(ImageRef::from_raw(Arc::new(image), ImageType::Unknown, None))
    }

    /// An independent handle over a copy of the current image.
    pub fn copy(&self) -> Result<ImageRef> {
        let current = self.raw()?;
        let copy = engine::call_uncached("copy", || Ok(current.duplicate()))?;
        Ok(ImageRef {
            image: Some(Arc::new(copy)),
            format: self.format,
            source: self.source.clone(),
            premultiplied: self.premultiplied,
        })
    }

    /// Release the image and the retained source bytes. Idempotent.
    pub fn close(&mut self) {
        if self.image.take().is_some() {
            log_debug!("image handle closed");
        }
        self.source = None;
        self.premultiplied = None;
    }

    pub fn is_closed(&self) -> bool {
        self.image.is_none()
    }

    pub(crate) fn raw(&self) -> Result<&Arc<RawImage>> {
        self.image.as_ref().ok_or(Error::Closed)
    }

    /// Run a single-input operation and install its result.
    fn apply<F>(&mut self, name: &'static str, params: &str, op: F) -> Result<()>
    where
        F: FnOnce(&RawImage) -> Result<RawImage> + Send,
    {
        let current = Arc::clone(self.raw()?);
        let next = engine::call(name, &[&current], params, || op(&current))?;
        self.image = Some(next);
        Ok(())
    }

    /// Run a two-input operation with `other` and install its result.
    fn apply_with<F>(&mut self, name: &'static str, other: &ImageRef, params: &str, op: F) -> Result<()>
    where
        F: FnOnce(&RawImage, &RawImage) -> Result<RawImage> + Send,
    {
        let current = Arc::clone(self.raw()?);
        let other = Arc::clone(other.raw()?);
        let next = engine::call(name, &[&current, &other], params, || op(&current, &other))?;
        self.image = Some(next);
        Ok(())
    }

    /// Replace metadata on a copy of the image, outside the cache.
    fn edit_meta(&mut self, name: &'static str, edit: impl FnOnce(&mut engine::Metadata) + Send) -> Result<()> {
        let current = Arc::clone(self.raw()?);
        let next = engine::call_uncached(name, || Ok(with_meta(&current, edit)))?;
        self.image = Some(next);
        Ok(())
    }

    // =====================================================================
    // Accessors
    // =====================================================================

    fn get<T>(&self, f: impl FnOnce(&RawImage) -> T) -> Option<T> {
        self.image.as_deref().map(f)
    }

    /// Format the image was decoded from.
    pub fn format(&self) -> ImageType {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.get(|i| i.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.get(|i| i.height).unwrap_or(0)
    }

    pub fn bands(&self) -> u32 {
        self.get(|i| i.bands).unwrap_or(0)
    }

    pub fn band_format(&self) -> Option<BandFormat> {
        self.get(|i| i.format)
    }

    pub fn coding(&self) -> Coding {
        self.get(|i| i.coding).unwrap_or_default()
    }

    pub fn interpretation(&self) -> Option<Interpretation> {
        self.get(|i| i.interpretation)
    }

    /// Horizontal resolution in pixels per millimetre.
    pub fn xres(&self) -> f64 {
        self.get(|i| i.xres).unwrap_or(0.0)
    }

    pub fn yres(&self) -> f64 {
        self.get(|i| i.yres).unwrap_or(0.0)
    }

    pub fn offset_x(&self) -> i32 {
        self.get(|i| i.xoffset).unwrap_or(0)
    }

    pub fn offset_y(&self) -> i32 {
        self.get(|i| i.yoffset).unwrap_or(0)
    }

    /// EXIF orientation, `0` when absent.
    pub fn orientation(&self) -> u16 {
        self.get(|i| i.meta.orientation.unwrap_or(0)).unwrap_or(0)
    }

    pub fn has_icc_profile(&self) -> bool {
        self.get(|i| i.meta.icc_profile.is_some()).unwrap_or(false)
    }

    pub fn icc_profile(&self) -> Option<Vec<u8>> {
        self.get(|i| i.meta.icc_profile.clone()).flatten()
    }

    pub fn has_alpha(&self) -> bool {
        self.get(RawImage::has_alpha).unwrap_or(false)
    }

    /// Pages stacked in this image.
    pub fn pages(&self) -> u32 {
        self.get(RawImage::page_count).unwrap_or(0)
    }

    /// Height of one page; the full height for single-page images.
    pub fn page_height(&self) -> u32 {
        self.get(|i| i.meta.page_height.unwrap_or(i.height)).unwrap_or(0)
    }

    pub fn is_premultiplied(&self) -> bool {
        self.premultiplied.is_some()
    }

    // =====================================================================
    // Resampling
    // =====================================================================

    /// Proportional resize.
    pub fn resize(&mut self, scale: f64, kernel: Kernel) -> Result<()> {
        self.resize_with_vscale(scale, scale, kernel)
    }

    /// Resize with independent horizontal and vertical factors.
    ///
    /// Images with alpha are premultiplied for the duration of the resize
    /// unless the caller already premultiplied them.
    pub fn resize_with_vscale(&mut self, hscale: f64, vscale: f64, kernel: Kernel) -> Result<()> {
        let current = Arc::clone(self.raw()?);
        let params = format!("{hscale} {vscale} {kernel:?}");
        if !current.has_alpha() || self.premultiplied.is_some() {
            return self.apply("resize", &params, |i| resample::resize(i, hscale, vscale, kernel));
        }

        let restore = current.format;
        let pre = engine::call("premultiply", &[&current], "", || conversion::premultiply(&current))?;
        let resized = engine::call("resize", &[&pre], &params, || resample::resize(&pre, hscale, vscale, kernel))?;
        let out = engine::call("unpremultiply", &[&resized], &format!("{restore:?}"), || {
            conversion::unpremultiply(&resized, restore)
        })?;
        self.image = Some(out);
        Ok(())
    }

    /// Shrink to fit `width x height`, cropping by `interesting`.
    pub fn thumbnail(&mut self, width: u32, height: u32, interesting: Interesting, size: Size) -> Result<()> {
        self.apply("thumbnail", &format!("{width} {height} {interesting:?} {size:?}"), |i| {
            resample::thumbnail(i, width, height, interesting, size)
        })
    }

    // =====================================================================
    // Geometry
    // =====================================================================

    pub fn extract_area(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<()> {
        self.apply("extract_area", &format!("{left} {top} {width} {height}"), |i| {
            conversion::extract_area(i, left, top, width, height)
        })
    }

    /// Place the image at `left, top` in a `width x height` canvas.
    pub fn embed(&mut self, left: i32, top: i32, width: u32, height: u32, extend: Extend) -> Result<()> {
        self.apply("embed", &format!("{left} {top} {width} {height} {extend:?}"), |i| {
            conversion::embed(i, left, top, width, height, extend, &[0.0])
        })
    }

    /// [`embed`](Self::embed) with a solid `background` surround.
    pub fn embed_background(&mut self, left: i32, top: i32, width: u32, height: u32, background: Color) -> Result<()> {
        let fill = fill_values(self.raw()?, background.into());
        self.apply("embed", &format!("{left} {top} {width} {height} {fill:?}"), |i| {
            conversion::embed(i, left, top, width, height, Extend::Background, &fill)
        })
    }

    pub fn flip(&mut self, direction: Direction) -> Result<()> {
        self.apply("flip", &format!("{direction:?}"), |i| conversion::flip(i, direction))
    }

    /// Lossless clockwise rotation.
    pub fn rotate(&mut self, angle: Angle) -> Result<()> {
        if angle == Angle::D0 {
            return Ok(());
        }
        self.apply("rot", &format!("{angle:?}"), |i| conversion::rot(i, angle))
    }

    /// Clockwise rotation by any angle. Multiples of 90 degrees are lossless;
    /// anything else is resampled with a black surround.
    pub fn rotate_by(&mut self, degrees: f64) -> Result<()> {
        if degrees.fract() == 0.0
            && let Some(angle) = Angle::from_degrees(degrees as i32)
        {
            return self.rotate(angle);
        }
        self.similarity(1.0, degrees, ColorRGBA::new(0, 0, 0, 255), 0.0, 0.0, 0.0, 0.0)
    }

    /// Scale, rotate clockwise by `angle` degrees and translate.
    #[allow(clippy::too_many_arguments)]
    pub fn similarity(
        &mut self,
        scale: f64,
        angle: f64,
        background: ColorRGBA,
        idx: f64,
        idy: f64,
        odx: f64,
        ody: f64,
    ) -> Result<()> {
        let fill = fill_values(self.raw()?, background);
        let params = Similarity {
            scale,
            angle,
            idx,
            idy,
            odx,
            ody,
            interpolator: Interpolator::Bicubic,
        };
        self.apply("similarity", &format!("{params:?} {fill:?}"), |i| {
            resample::similarity(i, &params, &fill)
        })
    }

    /// Replicate each pixel `xfac x yfac` times.
    pub fn zoom(&mut self, xfac: u32, yfac: u32) -> Result<()> {
        self.apply("zoom", &format!("{xfac} {yfac}"), |i| conversion::zoom(i, xfac, yfac))
    }

    /// Bring the pixels upright according to the EXIF orientation and set
    /// the orientation to 1.
    pub fn auto_rotate(&mut self) -> Result<()> {
        let orientation = self.orientation();
        let (angle, mirror) = orientation_transform(orientation);
        self.apply("autorot", &orientation.to_string(), |i| {
            let rotated;
            let mut out = i;
            if angle != Angle::D0 {
                rotated = conversion::rot(out, angle)?;
                out = &rotated;
            }
            let mut upright = if mirror {
                conversion::flip(out, Direction::Horizontal)?
            } else {
                out.duplicate()
            };
            upright.meta.orientation = Some(1);
            Ok(upright)
        })
    }

    // =====================================================================
    // Filters and arithmetic
    // =====================================================================

    pub fn invert(&mut self) -> Result<()> {
        self.apply("invert", "", arithmetic::invert)
    }

    pub fn gaussian_blur(&mut self, sigma: f64) -> Result<()> {
        self.apply("gaussblur", &sigma.to_string(), |i| convolution::gaussian_blur(i, sigma))
    }

    /// Unsharp mask: differences under `x1` are left alone, larger ones are
    /// amplified by `m2`.
    pub fn sharpen(&mut self, sigma: f64, x1: f64, m2: f64) -> Result<()> {
        self.apply("sharpen", &format!("{sigma} {x1} {m2}"), |i| convolution::sharpen(i, sigma, x1, m2))
    }

    /// `out = in * a + b` per band.
    pub fn linear(&mut self, a: &[f64], b: &[f64]) -> Result<()> {
        if a.len() != b.len() {
            return Err(Error::invalid(format!(
                "linear: {} multipliers but {} offsets",
                a.len(),
                b.len()
            )));
        }
        self.apply("linear", &format!("{a:?} {b:?}"), |i| arithmetic::linear(i, a, b))
    }

    pub fn linear1(&mut self, a: f64, b: f64) -> Result<()> {
        self.linear(&[a], &[b])
    }

    fn binary(&mut self, other: &ImageRef, op: BinaryOp) -> Result<()> {
        self.apply_with(op.name(), other, "", |l, r| arithmetic::binary(l, r, op))
    }

    pub fn add(&mut self, other: &ImageRef) -> Result<()> {
        self.binary(other, BinaryOp::Add)
    }

    pub fn multiply(&mut self, other: &ImageRef) -> Result<()> {
        self.binary(other, BinaryOp::Multiply)
    }

    /// Divide by `other`; division by zero yields zero.
    pub fn divide(&mut self, other: &ImageRef) -> Result<()> {
        self.binary(other, BinaryOp::Divide)
    }

    /// Scale brightness and saturation, rotate hue (degrees), in LCh.
    pub fn modulate(&mut self, brightness: f64, saturation: f64, hue: f64) -> Result<()> {
        self.apply("modulate", &format!("{brightness} {saturation} {hue}"), |i| {
            colour::modulate(i, brightness, saturation, hue)
        })
    }

    /// Like [`modulate`](Self::modulate) but in HSV.
    pub fn modulate_hsv(&mut self, brightness: f64, saturation: f64, hue: f64) -> Result<()> {
        self.apply("modulate_hsv", &format!("{brightness} {saturation} {hue}"), |i| {
            colour::modulate_hsv(i, brightness, saturation, hue)
        })
    }

    // =====================================================================
    // Compositing and drawing
    // =====================================================================

    /// Blend `overlay` onto this image with its top-left corner at `x, y`.
    pub fn composite(&mut self, overlay: &ImageRef, mode: BlendMode, x: i32, y: i32) -> Result<()> {
        self.apply_with("composite", overlay, &format!("{mode:?} {x} {y}"), |base, over| {
            draw::composite(base, over, mode, x, y)
        })
    }

    /// Blend each layer in order. Nothing is installed unless every layer
    /// succeeds.
    pub fn composite_multi(&mut self, layers: &[ImageComposite<'_>]) -> Result<()> {
        let mut current = Arc::clone(self.raw()?);
        for layer in layers {
            let over = Arc::clone(layer.image.raw()?);
            let (mode, x, y) = (layer.mode, layer.x, layer.y);
            current = engine::call("composite", &[&current, &over], &format!("{mode:?} {x} {y}"), || {
                draw::composite(&current, &over, mode, x, y)
            })?;
        }
        self.image = Some(current);
        Ok(())
    }

    /// Render a text overlay. Empty text leaves the image unchanged.
    pub fn label(&mut self, params: &LabelParams) -> Result<()> {
        let params = params.with_defaults();
        if params.text.is_empty() {
            return Ok(());
        }
        let (width, height) = (self.width(), self.height());
        let label = Label {
            text: &params.text,
            font_size: f64::from(params.font_size()),
            box_width: params.width.resolve(width).max(1) as u32,
            box_height: params.height.resolve(height).max(1) as u32,
            left: params.offset_x.resolve(width) as i32,
            top: params.offset_y.resolve(height) as i32,
            opacity: params.opacity.clamp(0.0, 1.0),
            ink: params.color,
            align: params.alignment,
        };
        self.apply("label", &format!("{label:?}"), |i| draw::label(i, &label))
    }

    /// Paint a rectangle, filled or as a one-pixel outline.
    pub fn draw_rect(&mut self, ink: ColorRGBA, left: i32, top: i32, width: u32, height: u32, fill: bool) -> Result<()> {
        let values = fill_values(self.raw()?, ink);
        self.apply("draw_rect", &format!("{values:?} {left} {top} {width} {height} {fill}"), |i| {
            draw::draw_rect(i, &values, left, top, width, height, fill)
        })
    }

    // =====================================================================
    // Bands
    // =====================================================================

    pub fn band_join(&mut self, others: &[&ImageRef]) -> Result<()> {
        let current = Arc::clone(self.raw()?);
        let others = others.iter().map(|o| o.raw().map(Arc::clone)).collect::<Result<Vec<_>>>()?;
        let mut inputs: Vec<&RawImage> = vec![&current];
        inputs.extend(others.iter().map(|o| o.as_ref()));
        let next = engine::call("bandjoin", &inputs, "", || {
            let rest: Vec<&RawImage> = others.iter().map(|o| o.as_ref()).collect();
            conversion::band_join(&current, &rest)
        })?;
        self.image = Some(next);
        Ok(())
    }

    pub fn band_join_const(&mut self, constants: &[f64]) -> Result<()> {
        self.apply("bandjoin_const", &format!("{constants:?}"), |i| conversion::band_join_const(i, constants))
    }

    /// Keep `count` bands starting at `start`.
    pub fn extract_band(&mut self, start: u32, count: u32) -> Result<()> {
        self.apply("extract_band", &format!("{start} {count}"), |i| conversion::extract_band(i, start, count))
    }

    // =====================================================================
    // Colour and sample format
    // =====================================================================

    pub fn to_colour_space(&mut self, interpretation: Interpretation) -> Result<()> {
        self.apply("colourspace", interpretation.as_str(), |i| colour::to_colourspace(i, interpretation))
    }

    pub fn cast(&mut self, format: BandFormat) -> Result<()> {
        self.apply("cast", &format!("{format:?}"), |i| conversion::cast(i, format))
    }

    /// Blend alpha against `background` and drop it.
    pub fn flatten(&mut self, background: Color) -> Result<()> {
        let mut fill = fill_values(self.raw()?, background.into());
        if self.has_alpha() {
            fill.pop();
        }
        self.apply("flatten", &format!("{fill:?}"), |i| conversion::flatten(i, &fill))
    }

    /// Append an opaque alpha band unless one is present.
    pub fn add_alpha(&mut self) -> Result<()> {
        if self.raw()?.has_alpha() {
            return Ok(());
        }
        self.apply("add_alpha", "", conversion::add_alpha)
    }

    /// Premultiply colour by alpha. No-op without alpha or when already
    /// premultiplied.
    pub fn premultiply_alpha(&mut self) -> Result<()> {
        let current = self.raw()?;
        if self.premultiplied.is_some() || !current.has_alpha() {
            return Ok(());
        }
        let format = current.format;
        self.apply("premultiply", "", conversion::premultiply)?;
        self.premultiplied = Some(format);
        Ok(())
    }

    /// Undo [`premultiply_alpha`](Self::premultiply_alpha) and cast back to
    /// the band format it started from. No-op unless premultiplied.
    pub fn unpremultiply_alpha(&mut self) -> Result<()> {
        let Some(format) = self.premultiplied else {
            return Ok(());
        };
        self.apply("unpremultiply", &format!("{format:?}"), |i| conversion::unpremultiply(i, format))?;
        self.premultiplied = None;
        Ok(())
    }

    // =====================================================================
    // Metadata
    // =====================================================================

    pub fn remove_icc_profile(&mut self) -> Result<()> {
        self.edit_meta("remove_icc_profile", |m| m.icc_profile = None)
    }

    /// Convert to sRGB and attach a compact sRGB profile.
    pub fn optimize_icc_profile(&mut self) -> Result<()> {
        self.apply("optimize_icc_profile", "", colour::optimize_icc_profile)
    }

    /// Drop EXIF data. The ICC profile and orientation are kept.
    pub fn remove_metadata(&mut self) -> Result<()> {
        self.edit_meta("remove_metadata", |m| m.exif = None)
    }

    pub fn remove_orientation(&mut self) -> Result<()> {
        self.edit_meta("remove_orientation", |m| m.orientation = None)
    }

    pub fn set_orientation(&mut self, orientation: u16) -> Result<()> {
        if !(1..=8).contains(&orientation) {
            log_warn!("set_orientation: {orientation} is not an EXIF orientation");
        }
        self.edit_meta("set_orientation", move |m| m.orientation = Some(orientation))
    }

    // =====================================================================
    // Output
    // =====================================================================

    /// Samples in the native band format, little-endian, interleaved.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let image = self.raw()?;
        let mut out = Vec::with_capacity(image.data.len() * image.format.bytes_per_sample());
        for &v in &image.data {
            match image.format {
                BandFormat::UChar => out.push(v as u8),
                BandFormat::Char => out.extend((v as i8).to_le_bytes()),
                BandFormat::UShort => out.extend((v as u16).to_le_bytes()),
                BandFormat::Short => out.extend((v as i16).to_le_bytes()),
                BandFormat::UInt => out.extend((v as u32).to_le_bytes()),
                BandFormat::Int => out.extend((v as i32).to_le_bytes()),
                BandFormat::Float => out.extend(v.to_le_bytes()),
                BandFormat::Double => out.extend(f64::from(v).to_le_bytes()),
            }
        }
        Ok(out)
    }

    /// Encode according to `params`.
    pub fn export(&self, params: &ExportParams) -> Result<(Vec<u8>, ImageMetadata)> {
        foreign::export(self.raw()?, self.format, params)
    }

    /// Encode in the format the image was loaded from, JPEG when that
    /// format cannot be saved.
    pub fn export_native(&self) -> Result<(Vec<u8>, ImageMetadata)> {
        let format = if registry::is_save_supported(self.format) {
            self.format
        } else {
            ImageType::Jpeg
        };
        self.export(&ExportParams::new(format))
    }

    pub fn export_jpeg(&self, params: Option<&JpegExportParams>) -> Result<(Vec<u8>, ImageMetadata)> {
        self.export(&params.cloned().unwrap_or_default().into())
    }

    pub fn export_png(&self, params: Option<&PngExportParams>) -> Result<(Vec<u8>, ImageMetadata)> {
        self.export(&params.cloned().unwrap_or_default().into())
    }

    pub fn export_webp(&self, params: Option<&WebpExportParams>) -> Result<(Vec<u8>, ImageMetadata)> {
        self.export(&params.cloned().unwrap_or_default().into())
    }

    pub fn export_tiff(&self, params: Option<&TiffExportParams>) -> Result<(Vec<u8>, ImageMetadata)> {
        self.export(&params.cloned().unwrap_or_default().into())
    }

    pub fn export_heif(&self, params: Option<&HeifExportParams>) -> Result<(Vec<u8>, ImageMetadata)> {
        self.export(&params.cloned().unwrap_or_default().into())
    }

    pub fn export_gif(&self, params: Option<&GifExportParams>) -> Result<(Vec<u8>, ImageMetadata)> {
        self.export(&params.cloned().unwrap_or_default().into())
    }

    /// Encode and push the bytes through `target`, then end it.
    pub fn export_to_target(&self, target: &Target, params: &ExportParams) -> Result<ImageMetadata> {
        let (bytes, metadata) = self.export(params)?;
        target.push_all(&bytes)?;
        Ok(metadata)
    }
}

impl Drop for ImageRef {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.image {
            Some(image) => write!(f, "ImageRef({} from {})", image.describe(), self.format),
            None => f.write_str("ImageRef(closed)"),
        }
    }
}
