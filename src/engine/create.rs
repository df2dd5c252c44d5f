//! Synthetic images.

use super::{RawImage, alloc_samples, check_size, map_rows};
use crate::error::{Error, Result};
use crate::types::{BandFormat, Interpretation};

/// An all-zero image.
pub(crate) fn black(width: u32, height: u32, bands: u32) -> Result<RawImage> {
    let len = check_size(width, height, bands)?;
    let interpretation = match bands {
        1 | 2 => Interpretation::BW,
        3 | 4 => Interpretation::Srgb,
        _ => Interpretation::Multiband,
    };
    RawImage::new(width, height, bands, BandFormat::UChar, interpretation, alloc_samples(len)?)
}

/// Two bands holding each pixel's own x and y coordinate.
pub(crate) fn xyz(width: u32, height: u32) -> Result<RawImage> {
    if width == 0 || height == 0 {
        return Err(Error::invalid(format!("xyz: bad size {width}x{height}")));
    }
    let data = map_rows(width, height, 2, |y, row| {
        for (x, px) in row.chunks_exact_mut(2).enumerate() {
            px[0] = x as f32;
            px[1] = y as f32;
        }
    })?;
    RawImage::new(width, height, 2, BandFormat::UInt, Interpretation::Multiband, data)
}

/// Identity lookup table: 256 entries, or 65536 for `ushort`.
pub(crate) fn identity(ushort: bool) -> Result<RawImage> {
    let (size, format) = if ushort {
        (65536u32, BandFormat::UShort)
    } else {
        (256, BandFormat::UChar)
    };
    let data = (0..size).map(|v| v as f32).collect();
    RawImage::new(size, 1, 1, format, Interpretation::Histogram, data)
}
