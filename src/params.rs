//! Parameter records for import, export and transforms.
//!
//! These structs describe *what* to do, not *how* to do it. The image handle,
//! the import/export pipeline and the planner consume them; none of them hold
//! engine state.
//!
//! ## Types
//!
//! - [`ImportParams`]: decode-time options. Unset fields are left to the loader.
//! - [`Quality`]: lossy encoding quality, clamped to 1–100 on construction.
//! - [`ExportParams`]: the generic export record the pipeline runs on.
//! - [`JpegExportParams`], [`PngExportParams`], [`WebpExportParams`],
//!   [`TiffExportParams`], [`HeifExportParams`], [`GifExportParams`]: per-format
//!   records with their own defaults, converted into [`ExportParams`].
//! - [`Sharpening`]: unsharp-mask parameters.
//! - [`LabelParams`]: text overlay.
//! - [`TransformParams`]: everything the planner needs.

use crate::registry::ImageType;
use crate::types::{
    Align, Anchor, Angle, Color, Extend, FlipDirection, Interpolator, Interpretation, Kernel,
    ResizeStrategy, Scalar,
};

pub const DEFAULT_QUALITY: u32 = 90;
pub const DEFAULT_COMPRESSION: u8 = 6;
pub const DEFAULT_FONT: &str = "sans 10";

/// Decode-time options.
///
/// Every field is optional so that several records can be layered with
/// [`merge`](Self::merge) and so loaders can tell "unset" from "false".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportParams {
    /// Turn loader warnings into errors.
    pub fail_on_error: Option<bool>,
    /// Apply the EXIF orientation while loading.
    pub auto_rotate: Option<bool>,
    /// Integer shrink-on-load factor.
    pub shrink: Option<u32>,
    /// Pages to load from multi-page formats; `-1` loads all of them.
    pub n_pages: Option<i32>,
}

impl ImportParams {
    /// Combine records; for each field the last record that sets it wins.
    pub fn merge<'a>(params: impl IntoIterator<Item = &'a ImportParams>) -> ImportParams {
        params
            .into_iter()
            .fold(ImportParams::default(), |acc, p| ImportParams {
                fail_on_error: p.fail_on_error.or(acc.fail_on_error),
                auto_rotate: p.auto_rotate.or(acc.auto_rotate),
                shrink: p.shrink.or(acc.shrink),
                n_pages: p.n_pages.or(acc.n_pages),
            })
    }

    pub fn is_empty(&self) -> bool {
        *self == ImportParams::default()
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

/// JPEG chroma subsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsampleMode {
    #[default]
    Auto,
    On,
    Off,
}

/// TIFF compression scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TiffCompression {
    None,
    #[default]
    Lzw,
    Deflate,
    Packbits,
}

/// Generic export record.
///
/// `quality`, `compression` and `interpretation` are optional; the export
/// pipeline fills them in with [`resolved`](Self::resolved).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportParams {
    /// `Unknown` means "the format the image was loaded from".
    pub format: ImageType,
    pub quality: Option<Quality>,
    /// zlib-style level, 0–9.
    pub compression: Option<u8>,
    pub interlaced: bool,
    pub lossless: bool,
    /// Encoder effort, 0–6; higher is slower and smaller.
    pub effort: u8,
    pub strip_metadata: bool,
    pub strip_profile: bool,
    /// Flatten alpha against this colour before encoding.
    pub background: Option<Color>,
    /// Convert to this colour space before encoding.
    pub interpretation: Option<Interpretation>,
    pub subsample: SubsampleMode,
    pub tiff_compression: TiffCompression,
}

impl ExportParams {
    pub fn new(format: ImageType) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Fill unset quality, compression and interpretation, and clamp effort.
    pub fn resolved(&self, current: Interpretation) -> ExportParams {
        ExportParams {
            quality: Some(self.quality.unwrap_or_default()),
            compression: Some(self.compression.unwrap_or(DEFAULT_COMPRESSION).min(9)),
            effort: self.effort.min(MAX_EFFORT),
            interpretation: Some(self.interpretation.unwrap_or(current)),
            ..self.clone()
        }
    }
}

/// Highest value of [`ExportParams::effort`].
pub const MAX_EFFORT: u8 = 6;

/// Map an effort from a format's native `min..=max` range onto `0..=MAX_EFFORT`.
fn rescale_effort(value: u8, min: u8, max: u8) -> u8 {
    let span = u16::from(max - min);
    let offset = u16::from(value.clamp(min, max) - min);
    ((offset * u16::from(MAX_EFFORT) + span / 2) / span) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub struct JpegExportParams {
    pub strip_metadata: bool,
    pub quality: Quality,
    /// Progressive encoding.
    pub interlace: bool,
    pub subsample_mode: SubsampleMode,
}

impl Default for JpegExportParams {
    fn default() -> Self {
        Self {
            strip_metadata: false,
            quality: Quality::new(80),
            interlace: false,
            subsample_mode: SubsampleMode::Auto,
        }
    }
}

impl From<JpegExportParams> for ExportParams {
    fn from(p: JpegExportParams) -> Self {
        ExportParams {
            format: ImageType::Jpeg,
            quality: Some(p.quality),
            interlaced: p.interlace,
            strip_metadata: p.strip_metadata,
            subsample: p.subsample_mode,
            ..ExportParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PngExportParams {
    pub strip_metadata: bool,
    pub compression: u8,
    pub interlace: bool,
}

impl Default for PngExportParams {
    fn default() -> Self {
        Self {
            strip_metadata: false,
            compression: DEFAULT_COMPRESSION,
            interlace: false,
        }
    }
}

impl From<PngExportParams> for ExportParams {
    fn from(p: PngExportParams) -> Self {
        ExportParams {
            format: ImageType::Png,
            compression: Some(p.compression.min(9)),
            interlaced: p.interlace,
            strip_metadata: p.strip_metadata,
            ..ExportParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebpExportParams {
    pub strip_metadata: bool,
    pub quality: Quality,
    pub lossless: bool,
    pub reduction_effort: u8,
}

impl Default for WebpExportParams {
    fn default() -> Self {
        Self {
            strip_metadata: false,
            quality: Quality::new(75),
            lossless: false,
            reduction_effort: 4,
        }
    }
}

impl From<WebpExportParams> for ExportParams {
    fn from(p: WebpExportParams) -> Self {
        ExportParams {
            format: ImageType::Webp,
            quality: Some(p.quality),
            lossless: p.lossless,
            effort: p.reduction_effort.min(MAX_EFFORT),
            strip_metadata: p.strip_metadata,
            ..ExportParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TiffExportParams {
    pub strip_metadata: bool,
    pub quality: Quality,
    pub compression: TiffCompression,
}

impl Default for TiffExportParams {
    fn default() -> Self {
        Self {
            strip_metadata: false,
            quality: Quality::new(80),
            compression: TiffCompression::Lzw,
        }
    }
}

impl From<TiffExportParams> for ExportParams {
    fn from(p: TiffExportParams) -> Self {
        ExportParams {
            format: ImageType::Tiff,
            quality: Some(p.quality),
            strip_metadata: p.strip_metadata,
            tiff_compression: p.compression,
            ..ExportParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeifExportParams {
    pub quality: Quality,
    pub lossless: bool,
    /// 0 (fastest) to 9 (slowest).
    pub effort: u8,
}

impl Default for HeifExportParams {
    fn default() -> Self {
        Self {
            quality: Quality::new(80),
            lossless: false,
            effort: 5,
        }
    }
}

impl From<HeifExportParams> for ExportParams {
    fn from(p: HeifExportParams) -> Self {
        ExportParams {
            format: ImageType::Heif,
            quality: Some(p.quality),
            lossless: p.lossless,
            effort: rescale_effort(p.effort, 0, 9),
            ..ExportParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GifExportParams {
    pub strip_metadata: bool,
    pub quality: Quality,
    /// 1 (fastest) to 10 (best palette).
    pub effort: u8,
}

impl Default for GifExportParams {
    fn default() -> Self {
        Self {
            strip_metadata: false,
            quality: Quality::new(75),
            effort: 7,
        }
    }
}

impl From<GifExportParams> for ExportParams {
    fn from(p: GifExportParams) -> Self {
        ExportParams {
            format: ImageType::Gif,
            quality: Some(p.quality),
            effort: rescale_effort(p.effort, 1, 10),
            strip_metadata: p.strip_metadata,
            ..ExportParams::default()
        }
    }
}

/// Unsharp-mask parameters.
///
/// - `sigma`: Gaussian radius of the mask
/// - `x1`: flat/jaggy threshold; differences below it are not sharpened
/// - `m2`: gain applied to differences above `x1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f64,
    pub x1: f64,
    pub m2: f64,
}

impl Sharpening {
    /// Light sharpening suitable for thumbnails.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            x1: 2.0,
            m2: 3.0,
        }
    }
}

/// A text overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelParams {
    /// Empty text disables the label.
    pub text: String,
    /// `"<family> <size>"`; only the size is honoured.
    pub font: String,
    pub width: Scalar,
    pub height: Scalar,
    pub offset_x: Scalar,
    pub offset_y: Scalar,
    /// 0 means fully opaque.
    pub opacity: f32,
    pub color: Color,
    pub alignment: Align,
}

impl Default for LabelParams {
    fn default() -> Self {
        Self {
            text: String::new(),
            font: DEFAULT_FONT.to_string(),
            width: Scalar::scale_of(1.0),
            height: Scalar::scale_of(1.0),
            offset_x: Scalar::default(),
            offset_y: Scalar::default(),
            opacity: 1.0,
            color: Color::WHITE,
            alignment: Align::Low,
        }
    }
}

impl LabelParams {
    /// Replace zero or empty fields with their defaults.
    pub fn with_defaults(&self) -> LabelParams {
        let mut p = self.clone();
        if p.font.trim().is_empty() {
            p.font = DEFAULT_FONT.to_string();
        }
        if p.width.is_zero() {
            p.width = Scalar::scale_of(1.0);
        }
        if p.height.is_zero() {
            p.height = Scalar::scale_of(1.0);
        }
        if p.opacity == 0.0 {
            p.opacity = 1.0;
        }
        p
    }

    /// Point size from the trailing number of `font`, default 10.
    pub fn font_size(&self) -> f32 {
        self.font
            .split_whitespace()
            .last()
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|s| *s > 0.0)
            .unwrap_or(10.0)
    }
}

/// Declarative transform intent consumed by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub resize_strategy: ResizeStrategy,
    pub pad_strategy: Extend,
    /// Fill colour for [`Extend::Background`].
    pub background: Color,
    pub crop_anchor: Anchor,
    pub crop_offset_x: Scalar,
    pub crop_offset_y: Scalar,
    /// Upper bound on `target / source`; 0 disables the cap.
    pub max_scale: f64,
    pub reduction_kernel: Kernel,
    pub interpolator: Interpolator,
    pub zoom_x: u32,
    pub zoom_y: u32,
    pub invert: bool,
    pub rotate: Angle,
    pub auto_rotate: bool,
    pub blur_sigma: f64,
    pub sharpen: Option<Sharpening>,
    pub flip: FlipDirection,
    pub width: Scalar,
    pub height: Scalar,
    pub label: Option<LabelParams>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            resize_strategy: ResizeStrategy::Auto,
            pad_strategy: Extend::Black,
            background: Color::BLACK,
            crop_anchor: Anchor::Auto,
            crop_offset_x: Scalar::default(),
            crop_offset_y: Scalar::default(),
            max_scale: 0.0,
            reduction_kernel: Kernel::Lanczos3,
            interpolator: Interpolator::Bicubic,
            zoom_x: 0,
            zoom_y: 0,
            invert: false,
            rotate: Angle::D0,
            auto_rotate: false,
            blur_sigma: 0.0,
            sharpen: None,
            flip: FlipDirection::None,
            width: Scalar::default(),
            height: Scalar::default(),
            label: None,
        }
    }
}
