//! Geometry, band and format conversions.

use super::{RawImage, map_rows};
use crate::error::{Error, Result};
use crate::types::{Angle, BandFormat, Direction, Extend, Interpretation};

/// Crop to the rectangle `left, top, width, height`.
pub(crate) fn extract_area(image: &RawImage, left: u32, top: u32, width: u32, height: u32) -> Result<RawImage> {
    if width == 0
        || height == 0
        || u64::from(left) + u64::from(width) > u64::from(image.width)
        || u64::from(top) + u64::from(height) > u64::from(image.height)
    {
        return Err(Error::invalid(format!(
            "extract_area: {width}x{height}+{left}+{top} outside {}x{}",
            image.width, image.height
        )));
    }
    let bands = image.bands as usize;
    let data = map_rows(width, height, image.bands, |y, row| {
        let start = image.index(left, top + y);
        row.copy_from_slice(&image.data[start..start + width as usize * bands]);
    })?;
    image.like(width, height, image.bands, data)
}

fn mirror(i: i64, n: i64) -> i64 {
    let m = i.rem_euclid(2 * n);
    if m >= n { 2 * n - 1 - m } else { m }
}

/// Place `image` at `left, top` inside a `width x height` canvas.
///
/// `background` gives the fill for [`Extend::Background`], one value per
/// band or a single value for all bands.
pub(crate) fn embed(
    image: &RawImage,
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    extend: Extend,
    background: &[f64],
) -> Result<RawImage> {
    if width == 0 || height == 0 {
        return Err(Error::invalid("embed: empty canvas"));
    }
    let bands = image.bands as usize;
    let white = super::max_alpha_for(image.format, image.interpretation);
    let fill: Vec<f32> = match extend {
        Extend::White => vec![white; bands],
        Extend::Background => (0..bands)
            .map(|b| {
                if image.has_alpha() && b == bands - 1 {
                    image.max_alpha()
                } else {
                    background.get(b).or(background.first()).copied().unwrap_or(0.0) as f32
                }
            })
            .collect(),
        _ => vec![0.0; bands],
    };

    let (w, h) = (i64::from(image.width), i64::from(image.height));
    let data = map_rows(width, height, image.bands, |y, row| {
        let sy = i64::from(y) - i64::from(top);
        for x in 0..width as usize {
            let sx = x as i64 - i64::from(left);
            let out = &mut row[x * bands..(x + 1) * bands];
            let source = if (0..w).contains(&sx) && (0..h).contains(&sy) {
                Some((sx, sy))
            } else {
                match extend {
                    Extend::Copy => Some((sx.clamp(0, w - 1), sy.clamp(0, h - 1))),
                    Extend::Repeat => Some((sx.rem_euclid(w), sy.rem_euclid(h))),
                    Extend::Mirror => Some((mirror(sx, w), mirror(sy, h))),
                    _ => None,
                }
            };
            match source {
                Some((px, py)) => out.copy_from_slice(image.pixel(px as u32, py as u32)),
                None => out.copy_from_slice(&fill),
            }
        }
    })?;
    let mut out = image.like(width, height, image.bands, data)?;
    out.xoffset = left;
    out.yoffset = top;
    Ok(out)
}

pub(crate) fn flip(image: &RawImage, direction: Direction) -> Result<RawImage> {
    let (w, h) = (image.width, image.height);
    let bands = image.bands as usize;
    let data = map_rows(w, h, image.bands, |y, row| match direction {
        Direction::Horizontal => {
            for x in 0..w {
                let dst = x as usize * bands;
                row[dst..dst + bands].copy_from_slice(image.pixel(w - 1 - x, y));
            }
        }
        Direction::Vertical => {
            let start = image.index(0, h - 1 - y);
            row.copy_from_slice(&image.data[start..start + image.row_len()]);
        }
    })?;
    image.with_data(data)
}

/// Rotate clockwise by a multiple of 90 degrees.
pub(crate) fn rot(image: &RawImage, angle: Angle) -> Result<RawImage> {
    let (w, h) = (image.width, image.height);
    let (ow, oh) = match angle {
        Angle::D90 | Angle::D270 => (h, w),
        Angle::D0 | Angle::D180 => (w, h),
    };
    let bands = image.bands as usize;
    let data = map_rows(ow, oh, image.bands, |y, row| {
        for x in 0..ow {
            let (sx, sy) = match angle {
                Angle::D0 => (x, y),
                Angle::D90 => (y, h - 1 - x),
                Angle::D180 => (w - 1 - x, h - 1 - y),
                Angle::D270 => (w - 1 - y, x),
            };
            let dst = x as usize * bands;
            row[dst..dst + bands].copy_from_slice(image.pixel(sx, sy));
        }
    })?;
    let mut out = image.like(ow, oh, image.bands, data)?;
    if matches!(angle, Angle::D90 | Angle::D270) {
        std::mem::swap(&mut out.xres, &mut out.yres);
        // Pages no longer stack along the vertical axis
        out.meta.page_height = None;
    }
    Ok(out)
}

/// Nearest-neighbour enlargement by integer factors.
pub(crate) fn zoom(image: &RawImage, xfac: u32, yfac: u32) -> Result<RawImage> {
    if xfac == 0 || yfac == 0 {
        return Err(Error::invalid("zoom: factors must be positive"));
    }
    let ow = image.width.checked_mul(xfac).ok_or_else(|| Error::invalid("zoom: too large"))?;
    let oh = image.height.checked_mul(yfac).ok_or_else(|| Error::invalid("zoom: too large"))?;
    let bands = image.bands as usize;
    let data = map_rows(ow, oh, image.bands, |y, row| {
        for x in 0..ow {
            let dst = x as usize * bands;
            row[dst..dst + bands].copy_from_slice(image.pixel(x / xfac, y / yfac));
        }
    })?;
    let mut out = image.like(ow, oh, image.bands, data)?;
    out.meta.page_height = image.meta.page_height.map(|ph| ph * yfac);
    Ok(out)
}

fn interpretation_for_bands(image: &RawImage, bands: u32) -> Interpretation {
    match (bands, image.format) {
        (1 | 2, BandFormat::UShort) => Interpretation::Grey16,
        (1 | 2, _) => Interpretation::BW,
        _ if image.interpretation.colour_bands().is_some_and(|n| n == bands || n + 1 == bands) => {
            image.interpretation
        }
        _ => Interpretation::Multiband,
    }
}

/// Keep bands `start..start + count`.
pub(crate) fn extract_band(image: &RawImage, start: u32, count: u32) -> Result<RawImage> {
    if count == 0 || start.checked_add(count).is_none_or(|end| end > image.bands) {
        return Err(Error::invalid(format!(
            "extract_band: bands {start}..{} outside 0..{}",
            start.saturating_add(count),
            image.bands
        )));
    }
    let bands = image.bands as usize;
    let (start, count) = (start as usize, count as usize);
    let data = image
        .data
        .chunks_exact(bands)
        .flat_map(|px| px[start..start + count].iter().copied())
        .collect();
    let mut out = image.like(image.width, image.height, count as u32, data)?;
    out.interpretation = interpretation_for_bands(image, count as u32);
    Ok(out)
}

/// Append the bands of `others` to `image`. All images must share a size.
pub(crate) fn band_join(image: &RawImage, others: &[&RawImage]) -> Result<RawImage> {
    if let Some(bad) = others
        .iter()
        .find(|o| o.width != image.width || o.height != image.height)
    {
        return Err(Error::invalid(format!(
            "band_join: {}x{} does not match {}x{}",
            bad.width, bad.height, image.width, image.height
        )));
    }
    let total: u32 = image.bands + others.iter().map(|o| o.bands).sum::<u32>();
    let pixels = image.width as usize * image.height as usize;
    let mut data = Vec::with_capacity(super::check_size(image.width, image.height, total)?);
    for p in 0..pixels {
        for source in std::iter::once(image).chain(others.iter().copied()) {
            let b = source.bands as usize;
            data.extend_from_slice(&source.data[p * b..(p + 1) * b]);
        }
    }
    let mut out = image.like(image.width, image.height, total, data)?;
    out.interpretation = interpretation_for_bands(image, total);
    Ok(out)
}

/// Append constant bands.
pub(crate) fn band_join_const(image: &RawImage, constants: &[f64]) -> Result<RawImage> {
    if constants.is_empty() {
        return Err(Error::invalid("band_join_const: no constants"));
    }
    let total = u32::try_from(constants.len())
        .ok()
        .and_then(|n| image.bands.checked_add(n))
        .ok_or_else(|| Error::invalid("band_join_const: too many constants"))?;
    let mut data = Vec::with_capacity(super::check_size(image.width, image.height, total)?);
    for px in image.data.chunks_exact(image.bands as usize) {
        data.extend_from_slice(px);
        data.extend(constants.iter().map(|&c| image.format.clamp_sample(c as f32)));
    }
    let mut out = image.like(image.width, image.height, total, data)?;
    out.interpretation = interpretation_for_bands(image, total);
    Ok(out)
}

/// Convert to `format`, clamping to its range.
pub(crate) fn cast(image: &RawImage, format: BandFormat) -> Result<RawImage> {
    let data = super::map_samples(&image.data, |_, v| format.clamp_sample(v));
    let mut out = image.with_data(data)?;
    out.format = format;
    Ok(out)
}

/// Multiply colour bands by `alpha / max_alpha`. The result is float.
pub(crate) fn premultiply(image: &RawImage) -> Result<RawImage> {
    if !image.has_alpha() {
        return Err(Error::invalid("premultiply: image has no alpha"));
    }
    let bands = image.bands as usize;
    let max = image.max_alpha();
    let data = super::map_samples(&image.data, |i, v| {
        let alpha_index = i - i % bands + bands - 1;
        if i == alpha_index {
            v
        } else {
            v * image.data[alpha_index] / max
        }
    });
    let mut out = image.with_data(data)?;
    out.format = BandFormat::Float;
    Ok(out)
}

/// Undo [`premultiply`] and cast back to `restore`.
pub(crate) fn unpremultiply(image: &RawImage, restore: BandFormat) -> Result<RawImage> {
    if !image.has_alpha() {
        return Err(Error::invalid("unpremultiply: image has no alpha"));
    }
    let bands = image.bands as usize;
    let max = super::max_alpha_for(restore, image.interpretation);
    let data = super::map_samples(&image.data, |i, v| {
        let alpha_index = i - i % bands + bands - 1;
        let alpha = image.data[alpha_index];
        let v = if i == alpha_index {
            v
        } else if alpha > 0.0 {
            v * max / alpha
        } else {
            0.0
        };
        restore.clamp_sample(v)
    });
    let mut out = image.with_data(data)?;
    out.format = restore;
    Ok(out)
}

/// Remove alpha by blending against `background`.
pub(crate) fn flatten(image: &RawImage, background: &[f64]) -> Result<RawImage> {
    if !image.has_alpha() {
        return Ok(image.duplicate());
    }
    let bands = image.bands as usize;
    let colour = bands - 1;
    let max = image.max_alpha();
    let mut data = Vec::with_capacity(image.data.len() / bands * colour);
    for px in image.data.chunks_exact(bands) {
        let a = (px[colour] / max).clamp(0.0, 1.0);
        for (b, &c) in px[..colour].iter().enumerate() {
            let bg = background.get(b).or(background.first()).copied().unwrap_or(0.0) as f32;
            data.push(image.format.clamp_sample(c * a + bg * (1.0 - a)));
        }
    }
    image.like(image.width, image.height, colour as u32, data)
}

/// Append an opaque alpha band.
pub(crate) fn add_alpha(image: &RawImage) -> Result<RawImage> {
    band_join_const(image, &[f64::from(image.max_alpha())]).map(|mut out| {
        out.interpretation = image.interpretation;
        out
    })
}
