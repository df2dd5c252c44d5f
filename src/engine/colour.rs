//! Colour-space conversion, ICC transforms and modulation.
//!
//! Conversions pass every pixel through normalised, gamma-encoded sRGB in
//! `0..=1`. CMYK images that carry a CMYK ICC profile, and RGB images with an
//! embedded profile handed to [`optimize_icc_profile`], go through `lcms2`
//! instead of the closed-form formulas.

use super::{RawImage, max_alpha_for};
use crate::error::{Error, Result};
use crate::logging::log_warn;
use crate::types::{BandFormat, Interpretation};
use lcms2::{ColorSpaceSignature, Intent, PixelFormat, Profile, Transform};

/// D65 reference white, `Y = 1`.
const WHITE: [f64; 3] = [0.95047, 1.0, 1.08883];

fn decode_gamma(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn encode_gamma(c: f64) -> f64 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.max(0.0).powf(1.0 / 2.4) - 0.055
    }
}

fn rgb_to_xyz(rgb: [f64; 3]) -> [f64; 3] {
    let [r, g, b] = rgb.map(decode_gamma);
    [
        0.4124564 * r + 0.3575761 * g + 0.1804375 * b,
        0.2126729 * r + 0.7151522 * g + 0.0721750 * b,
        0.0193339 * r + 0.1191920 * g + 0.9503041 * b,
    ]
}

fn xyz_to_rgb([x, y, z]: [f64; 3]) -> [f64; 3] {
    [
        3.2404542 * x - 1.5371385 * y - 0.4985314 * z,
        -0.9692660 * x + 1.8760108 * y + 0.0415560 * z,
        0.0556434 * x - 0.2040259 * y + 1.0572252 * z,
    ]
    .map(encode_gamma)
}

const EPSILON: f64 = 216.0 / 24389.0;
const KAPPA: f64 = 24389.0 / 27.0;

fn xyz_to_lab(xyz: [f64; 3]) -> [f64; 3] {
    let f = |t: f64| {
        if t > EPSILON {
            t.cbrt()
        } else {
            (KAPPA * t + 16.0) / 116.0
        }
    };
    let [fx, fy, fz] = [f(xyz[0] / WHITE[0]), f(xyz[1] / WHITE[1]), f(xyz[2] / WHITE[2])];
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

fn lab_to_xyz([l, a, b]: [f64; 3]) -> [f64; 3] {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let inv = |f: f64| {
        let cube = f * f * f;
        if cube > EPSILON { cube } else { (116.0 * f - 16.0) / KAPPA }
    };
    let y = if l > KAPPA * EPSILON { fy.powi(3) } else { l / KAPPA };
    [inv(fx) * WHITE[0], y * WHITE[1], inv(fz) * WHITE[2]]
}

fn lab_to_lch([l, a, b]: [f64; 3]) -> [f64; 3] {
    let h = b.atan2(a).to_degrees().rem_euclid(360.0);
    [l, a.hypot(b), h]
}

fn lch_to_lab([l, c, h]: [f64; 3]) -> [f64; 3] {
    let h = h.to_radians();
    [l, c * h.cos(), c * h.sin()]
}

/// Hue in degrees, saturation and value in `0..=1`.
fn rgb_to_hsv([r, g, b]: [f64; 3]) -> [f64; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    [h, s, max]
}

fn hsv_to_rgb([h, s, v]: [f64; 3]) -> [f64; 3] {
    let h = h.rem_euclid(360.0) / 60.0;
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

fn luminance(rgb: [f64; 3]) -> f64 {
    encode_gamma(rgb_to_xyz(rgb)[1])
}

/// Read the colour bands of one pixel into the sRGB hub.
///
/// `unit` is the sample value of full intensity for the integer-like spaces.
fn to_hub(space: Interpretation, px: &[f32], unit: f64) -> [f64; 3] {
    let v = |i: usize| f64::from(px[i]);
    match space {
        Interpretation::BW | Interpretation::Grey16 => [v(0) / unit; 3],
        Interpretation::ScRgb => [v(0), v(1), v(2)].map(encode_gamma),
        Interpretation::Cmyk => {
            let k = 1.0 - v(3) / unit;
            [0, 1, 2].map(|i| (1.0 - v(i) / unit) * k)
        }
        Interpretation::Hsv => hsv_to_rgb([v(0) / 255.0 * 360.0, v(1) / 255.0, v(2) / 255.0]),
        Interpretation::Xyz => xyz_to_rgb([v(0) / 100.0, v(1) / 100.0, v(2) / 100.0]),
        Interpretation::Lab => xyz_to_rgb(lab_to_xyz([v(0), v(1), v(2)])),
        Interpretation::Lch => xyz_to_rgb(lab_to_xyz(lch_to_lab([v(0), v(1), v(2)]))),
        _ => [v(0) / unit, v(1) / unit, v(2) / unit],
    }
}

/// Write hub colour into `out`, which holds exactly the space's colour bands.
fn from_hub(space: Interpretation, rgb: [f64; 3], unit: f64, out: &mut [f32]) {
    let rgb = rgb.map(|c| c.clamp(0.0, 1.0));
    let values: Vec<f64> = match space {
        Interpretation::BW | Interpretation::Grey16 => vec![luminance(rgb) * unit],
        Interpretation::ScRgb => rgb.map(decode_gamma).to_vec(),
        Interpretation::Cmyk => {
            let k = 1.0 - rgb[0].max(rgb[1]).max(rgb[2]);
            let ink = |c: f64| if k >= 1.0 { 0.0 } else { (1.0 - c - k) / (1.0 - k) };
            vec![ink(rgb[0]) * unit, ink(rgb[1]) * unit, ink(rgb[2]) * unit, k * unit]
        }
        Interpretation::Hsv => {
            let [h, s, v] = rgb_to_hsv(rgb);
            vec![h / 360.0 * 255.0, s * 255.0, v * 255.0]
        }
        Interpretation::Xyz => rgb_to_xyz(rgb).map(|c| c * 100.0).to_vec(),
        Interpretation::Lab => xyz_to_lab(rgb_to_xyz(rgb)).to_vec(),
        Interpretation::Lch => lab_to_lch(xyz_to_lab(rgb_to_xyz(rgb))).to_vec(),
        _ => rgb.map(|c| c * unit).to_vec(),
    };
    for (o, v) in out.iter_mut().zip(values) {
        *o = v as f32;
    }
}

fn unsupported(space: Interpretation) -> Error {
    Error::invalid(format!("colourspace: unsupported interpretation {space}"))
}

/// Per-pixel rewrite of the colour bands, keeping an alpha band if present.
fn remap<F>(image: &RawImage, target: Interpretation, format: BandFormat, f: F) -> Result<RawImage>
where
    F: Fn(&[f32], &mut [f32]) + Sync + Send,
{
    let colour_out = target.colour_bands().ok_or_else(|| unsupported(target))? as usize;
    let alpha = image.has_alpha();
    let src_bands = image.bands as usize;
    let out_bands = colour_out + usize::from(alpha);
    let alpha_scale = max_alpha_for(format, target) / image.max_alpha();

    let data = super::map_rows(image.width, image.height, out_bands as u32, |y, row| {
        let src = &image.data[image.index(0, y)..][..image.row_len()];
        for (px, out) in src.chunks_exact(src_bands).zip(row.chunks_exact_mut(out_bands)) {
            f(px, &mut out[..colour_out]);
            if alpha {
                out[colour_out] = px[src_bands - 1] * alpha_scale;
            }
            for v in out.iter_mut() {
                *v = format.clamp_sample(*v);
            }
        }
    })?;
    let mut out = image.like(image.width, image.height, out_bands as u32, data)?;
    out.format = format;
    out.interpretation = target;
    Ok(out)
}

fn check_bands(image: &RawImage) -> Result<()> {
    let needed = image
        .interpretation
        .colour_bands()
        .ok_or_else(|| unsupported(image.interpretation))?;
    if image.bands < needed {
        return Err(Error::invalid(format!(
            "colourspace: {} needs {needed} bands, image has {}",
            image.interpretation, image.bands
        )));
    }
    Ok(())
}

fn embedded_space(image: &RawImage) -> Option<ColorSpaceSignature> {
    let icc = image.meta.icc_profile.as_deref()?;
    Profile::new_icc(icc).ok().map(|p| p.color_space())
}

/// Convert to another interpretation.
pub(crate) fn to_colourspace(image: &RawImage, target: Interpretation) -> Result<RawImage> {
    let source = image.interpretation;
    if !source.is_colorspace_supported() {
        return Err(unsupported(source));
    }
    if !target.is_colorspace_supported() {
        return Err(unsupported(target));
    }
    check_bands(image)?;

    let format = target.natural_format();
    if source == target && image.format == format {
        return Ok(image.duplicate());
    }

    if source == Interpretation::Cmyk && matches!(embedded_space(image), Some(ColorSpaceSignature::CmykData)) {
        let rgb = icc_to_srgb(image)?;
        return if target == rgb.interpretation {
            Ok(rgb)
        } else {
            to_colourspace(&rgb, target)
        };
    }

    let src_unit = f64::from(image.max_alpha());
    let dst_unit = f64::from(max_alpha_for(format, target));
    remap(image, target, format, |px, out| {
        from_hub(target, to_hub(source, px, src_unit), dst_unit, out)
    })
}

fn gather<const N: usize, T: Copy + Default>(image: &RawImage, convert: impl Fn(f32) -> T) -> Vec<[T; N]> {
    image
        .data
        .chunks_exact(image.bands as usize)
        .map(|px| std::array::from_fn(|i| convert(px[i])))
        .collect()
}

/// Transform through the embedded ICC profile into sRGB.
///
/// 16-bit images produce [`Interpretation::Rgb16`], everything else 8-bit
/// [`Interpretation::Srgb`]. The embedded profile is dropped.
pub(crate) fn icc_to_srgb(image: &RawImage) -> Result<RawImage> {
    let icc = image
        .meta
        .icc_profile
        .as_deref()
        .ok_or_else(|| Error::invalid("icc_transform: image has no embedded profile"))?;
    let profile = Profile::new_icc(icc)?;
    let space = profile.color_space();
    let colour = image.colour_bands();
    let sixteen = image.format == BandFormat::UShort;
    let u8_of = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    let u16_of = |v: f32| v.round().clamp(0.0, 65535.0) as u16;

    let srgb = Profile::new_srgb();
    let intent = Intent::Perceptual;
    let rgb: Vec<[f32; 3]> = match (space, colour, sixteen) {
        (ColorSpaceSignature::CmykData, 4, false) => {
            let input = gather::<4, u8>(image, u8_of);
            let mut out = vec![[0u8; 3]; input.len()];
            Transform::<[u8; 4], [u8; 3]>::new(&profile, PixelFormat::CMYK_8, &srgb, PixelFormat::RGB_8, intent)?
                .transform_pixels(&input, &mut out);
            out.into_iter().map(|p| p.map(f32::from)).collect()
        }
        (ColorSpaceSignature::CmykData, 4, true) => {
            let input = gather::<4, u16>(image, u16_of);
            let mut out = vec![[0u16; 3]; input.len()];
            Transform::<[u16; 4], [u16; 3]>::new(&profile, PixelFormat::CMYK_16, &srgb, PixelFormat::RGB_16, intent)?
                .transform_pixels(&input, &mut out);
            out.into_iter().map(|p| p.map(f32::from)).collect()
        }
        (ColorSpaceSignature::RgbData, 3, false) => {
            let input = gather::<3, u8>(image, u8_of);
            let mut out = vec![[0u8; 3]; input.len()];
            Transform::<[u8; 3], [u8; 3]>::new(&profile, PixelFormat::RGB_8, &srgb, PixelFormat::RGB_8, intent)?
                .transform_pixels(&input, &mut out);
            out.into_iter().map(|p| p.map(f32::from)).collect()
        }
        (ColorSpaceSignature::RgbData, 3, true) => {
            let input = gather::<3, u16>(image, u16_of);
            let mut out = vec![[0u16; 3]; input.len()];
            Transform::<[u16; 3], [u16; 3]>::new(&profile, PixelFormat::RGB_16, &srgb, PixelFormat::RGB_16, intent)?
                .transform_pixels(&input, &mut out);
            out.into_iter().map(|p| p.map(f32::from)).collect()
        }
        (space, bands, _) => {
            return Err(Error::invalid(format!(
                "icc_transform: profile space {space:?} does not fit {bands} colour band(s)"
            )));
        }
    };

    let (format, interpretation) = if sixteen {
        (BandFormat::UShort, Interpretation::Rgb16)
    } else {
        (BandFormat::UChar, Interpretation::Srgb)
    };
    let alpha = image.has_alpha();
    let bands = 3 + u32::from(alpha);
    let alpha_scale = max_alpha_for(format, interpretation) / image.max_alpha();
    let mut data = Vec::with_capacity(rgb.len() * bands as usize);
    for (px, src) in rgb.iter().zip(image.data.chunks_exact(image.bands as usize)) {
        data.extend_from_slice(px);
        if alpha {
            data.push(format.clamp_sample(src[src.len() - 1] * alpha_scale));
        }
    }
    let mut out = image.like(image.width, image.height, bands, data)?;
    out.format = format;
    out.interpretation = interpretation;
    out.meta.icc_profile = None;
    Ok(out)
}

/// Serialised built-in sRGB profile.
pub(crate) fn srgb_profile() -> Result<Vec<u8>> {
    Ok(Profile::new_srgb().icc()?)
}

/// Move the image into sRGB and tag it with a compact sRGB profile.
///
/// Monochrome images are returned unchanged.
pub(crate) fn optimize_icc_profile(image: &RawImage) -> Result<RawImage> {
    if image.interpretation.colour_bands() == Some(1) {
        return Ok(image.duplicate());
    }
    let converted = match embedded_space(image) {
        Some(ColorSpaceSignature::CmykData | ColorSpaceSignature::RgbData) => icc_to_srgb(image).or_else(|e| {
            log_warn!("optimize_icc_profile: embedded profile unusable ({e}), converting directly");
            to_colourspace(image, Interpretation::Srgb)
        })?,
        _ if matches!(image.interpretation, Interpretation::Srgb | Interpretation::Rgb16) => image.duplicate(),
        _ => to_colourspace(image, Interpretation::Srgb)?,
    };
    let mut out = converted;
    out.meta.icc_profile = Some(srgb_profile()?);
    Ok(out)
}

fn check_modulatable(image: &RawImage) -> Result<()> {
    if !image.interpretation.is_colorspace_supported() {
        return Err(unsupported(image.interpretation));
    }
    check_bands(image)
}

/// Scale lightness and chroma and rotate hue in LCh.
pub(crate) fn modulate(image: &RawImage, brightness: f64, saturation: f64, hue: f64) -> Result<RawImage> {
    check_modulatable(image)?;
    let space = image.interpretation;
    let unit = f64::from(image.max_alpha());
    remap(image, space, image.format, |px, out| {
        let [l, c, h] = lab_to_lch(xyz_to_lab(rgb_to_xyz(to_hub(space, px, unit))));
        let lab = lch_to_lab([l * brightness, c * saturation, h + hue]);
        from_hub(space, xyz_to_rgb(lab_to_xyz(lab)), unit, out);
    })
}

/// Scale value and saturation and rotate hue in HSV.
pub(crate) fn modulate_hsv(image: &RawImage, brightness: f64, saturation: f64, hue: f64) -> Result<RawImage> {
    check_modulatable(image)?;
    let space = image.interpretation;
    let unit = f64::from(image.max_alpha());
    remap(image, space, image.format, |px, out| {
        let [h, s, v] = rgb_to_hsv(to_hub(space, px, unit));
        let rgb = hsv_to_rgb([h + hue, (s * saturation).clamp(0.0, 1.0), (v * brightness).clamp(0.0, 1.0)]);
        from_hub(space, rgb, unit, out);
    })
}
