//! Value types shared by the image handle, the planner and the engine.

use std::fmt;
use std::str::FromStr;

/// Numeric type of each band sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandFormat {
    UChar,
    Char,
    UShort,
    Short,
    UInt,
    Int,
    Float,
    Double,
}

impl BandFormat {
    /// Representable sample range, or `None` for floating formats.
    pub fn range(self) -> Option<(f32, f32)> {
        match self {
            BandFormat::UChar => Some((0.0, 255.0)),
            BandFormat::Char => Some((-128.0, 127.0)),
            BandFormat::UShort => Some((0.0, 65535.0)),
            BandFormat::Short => Some((-32768.0, 32767.0)),
            BandFormat::UInt => Some((0.0, u32::MAX as f32)),
            BandFormat::Int => Some((i32::MIN as f32, i32::MAX as f32)),
            BandFormat::Float | BandFormat::Double => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.range().is_some()
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            BandFormat::UChar | BandFormat::Char => 1,
            BandFormat::UShort | BandFormat::Short => 2,
            BandFormat::UInt | BandFormat::Int | BandFormat::Float => 4,
            BandFormat::Double => 8,
        }
    }

    /// Coerce a sample into this format's domain.
    pub fn clamp_sample(self, value: f32) -> f32 {
        match self.range() {
            Some((lo, hi)) => value.round().clamp(lo, hi),
            None => value,
        }
    }
}

/// Pixel coding. The engine only produces uncoded images; the other values are
/// reported for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Coding {
    #[default]
    None,
    Labq,
    Rad,
}

/// Colour-space label attached to a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpretation {
    Error,
    Multiband,
    BW,
    Histogram,
    Xyz,
    Lab,
    Cmyk,
    Lch,
    Srgb,
    Hsv,
    Rgb16,
    Grey16,
    ScRgb,
    Matrix,
}

impl Interpretation {
    pub fn as_str(self) -> &'static str {
        match self {
            Interpretation::Error => "error",
            Interpretation::Multiband => "multiband",
            Interpretation::BW => "b-w",
            Interpretation::Histogram => "histogram",
            Interpretation::Xyz => "xyz",
            Interpretation::Lab => "lab",
            Interpretation::Cmyk => "cmyk",
            Interpretation::Lch => "lch",
            Interpretation::Srgb => "srgb",
            Interpretation::Hsv => "hsv",
            Interpretation::Rgb16 => "rgb16",
            Interpretation::Grey16 => "grey16",
            Interpretation::ScRgb => "scrgb",
            Interpretation::Matrix => "matrix",
        }
    }

    /// Whether the colour converter can go to and from this space.
    pub fn is_colorspace_supported(self) -> bool {
        matches!(
            self,
            Interpretation::BW
                | Interpretation::Xyz
                | Interpretation::Lab
                | Interpretation::Cmyk
                | Interpretation::Lch
                | Interpretation::Srgb
                | Interpretation::Hsv
                | Interpretation::Rgb16
                | Interpretation::Grey16
                | Interpretation::ScRgb
        )
    }

    /// Number of colour bands, excluding alpha.
    pub fn colour_bands(self) -> Option<u32> {
        match self {
            Interpretation::BW | Interpretation::Grey16 => Some(1),
            Interpretation::Cmyk => Some(4),
            Interpretation::Xyz
            | Interpretation::Lab
            | Interpretation::Lch
            | Interpretation::Srgb
            | Interpretation::Hsv
            | Interpretation::Rgb16
            | Interpretation::ScRgb => Some(3),
            _ => None,
        }
    }

    /// The band format a conversion into this space produces.
    pub fn natural_format(self) -> BandFormat {
        match self {
            Interpretation::Rgb16 | Interpretation::Grey16 => BandFormat::UShort,
            Interpretation::Xyz
            | Interpretation::Lab
            | Interpretation::Lch
            | Interpretation::ScRgb
            | Interpretation::Matrix => BandFormat::Float,
            _ => BandFormat::UChar,
        }
    }

    /// Value of a fully opaque alpha sample in this space.
    pub fn max_alpha(self) -> f32 {
        match self {
            Interpretation::Rgb16 | Interpretation::Grey16 => 65535.0,
            Interpretation::ScRgb => 1.0,
            _ => 255.0,
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduction kernel used when shrinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Kernel {
    Nearest,
    Linear,
    Cubic,
    Mitchell,
    Lanczos2,
    #[default]
    Lanczos3,
}

/// Sampler used when enlarging or for affine transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolator {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
    Lbb,
    Nohalo,
    Vsqbs,
}

impl Interpolator {
    pub fn name(self) -> &'static str {
        match self {
            Interpolator::Nearest => "nearest",
            Interpolator::Bilinear => "bilinear",
            Interpolator::Bicubic => "bicubic",
            Interpolator::Lbb => "lbb",
            Interpolator::Nohalo => "nohalo",
            Interpolator::Vsqbs => "vsqbs",
        }
    }

    /// The kernel the engine samples with for this interpolator.
    ///
    /// The edge-sharpening samplers (lbb, nohalo, vsqbs) run as bicubic.
    pub fn kernel(self) -> Kernel {
        match self {
            Interpolator::Nearest => Kernel::Nearest,
            Interpolator::Bilinear => Kernel::Linear,
            _ => Kernel::Cubic,
        }
    }
}

impl FromStr for Interpolator {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Interpolator::Nearest),
            "bilinear" => Ok(Interpolator::Bilinear),
            "bicubic" => Ok(Interpolator::Bicubic),
            "lbb" => Ok(Interpolator::Lbb),
            "nohalo" => Ok(Interpolator::Nohalo),
            "vsqbs" => Ok(Interpolator::Vsqbs),
            other => Err(format!("unknown interpolator '{other}'")),
        }
    }
}

/// How the area outside an embedded image is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Extend {
    #[default]
    Black,
    Copy,
    Repeat,
    Mirror,
    White,
    Background,
}

/// Where a crop window sits when no explicit offset is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Anchor {
    #[default]
    Auto,
    Centre,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// How target width and height are reconciled with the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResizeStrategy {
    #[default]
    Auto,
    Embed,
    Crop,
    Stretch,
}

/// Flip requested by a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlipDirection {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Axis of a single flip primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Lossless rotation angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Angle {
    #[default]
    D0,
    D90,
    D180,
    D270,
}

impl Angle {
    pub fn degrees(self) -> u32 {
        match self {
            Angle::D0 => 0,
            Angle::D90 => 90,
            Angle::D180 => 180,
            Angle::D270 => 270,
        }
    }

    /// Angle for a multiple of 90 degrees, any sign.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Angle::D0),
            90 => Some(Angle::D90),
            180 => Some(Angle::D180),
            270 => Some(Angle::D270),
            _ => None,
        }
    }
}

/// Porter-Duff and separable blend modes for [`composite`](crate::ImageRef::composite).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    Clear,
    Source,
    #[default]
    Over,
    In,
    Out,
    Atop,
    Dest,
    DestOver,
    Xor,
    Add,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Difference,
    Exclusion,
}

/// Region of interest used by thumbnail smart-crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interesting {
    #[default]
    None,
    Centre,
    Entropy,
    Attention,
    Low,
    High,
}

/// Whether thumbnailing may enlarge, shrink, or distort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Size {
    #[default]
    Both,
    Up,
    Down,
    Force,
}

/// Horizontal text alignment for labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Align {
    #[default]
    Low,
    Centre,
    High,
}

/// An opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// An RGB colour with alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorRGBA {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorRGBA {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl From<Color> for ColorRGBA {
    fn from(c: Color) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: 255,
        }
    }
}

/// A dimension that is either absolute or a fraction of some base.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scalar {
    pub value: f64,
    pub relative: bool,
}

impl Scalar {
    /// An absolute value.
    pub fn value_of(value: f64) -> Self {
        Self {
            value,
            relative: false,
        }
    }

    /// A fraction of the base it is resolved against.
    pub fn scale_of(value: f64) -> Self {
        Self {
            value,
            relative: true,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0 && !self.relative
    }

    pub fn get(&self, base: u32) -> f64 {
        if self.relative {
            self.value * f64::from(base)
        } else {
            self.value
        }
    }

    /// Resolve against `base`, rounding half away from zero.
    pub fn resolve(&self, base: u32) -> i64 {
        self.get(base).round() as i64
    }
}
