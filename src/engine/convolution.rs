//! Gaussian blur and unsharp masking.

use super::{RawImage, map_rows};
use crate::error::{Error, Result};

/// Normalised 1-D Gaussian with radius `ceil(3 * sigma)`.
fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Separable convolution with edge samples repeated. Output stays in float.
fn convolve(image: &RawImage, kernel: &[f32]) -> Result<Vec<f32>> {
    let (w, h) = (image.width as i64, image.height as i64);
    let bands = image.bands as usize;
    let radius = (kernel.len() / 2) as i64;

    let horizontal = map_rows(image.width, image.height, image.bands, |y, row| {
        for x in 0..w {
            for b in 0..bands {
                let acc: f32 = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, wt)| {
                        let sx = (x + k as i64 - radius).clamp(0, w - 1) as u32;
                        wt * image.pixel(sx, y)[b]
                    })
                    .sum();
                row[x as usize * bands + b] = acc;
            }
        }
    })?;

    let stride = image.row_len();
    map_rows(image.width, image.height, image.bands, |y, row| {
        for (i, out) in row.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .enumerate()
                .map(|(k, wt)| {
                    let sy = (i64::from(y) + k as i64 - radius).clamp(0, h - 1) as usize;
                    wt * horizontal[sy * stride + i]
                })
                .sum();
        }
    })
}

pub(crate) fn gaussian_blur(image: &RawImage, sigma: f64) -> Result<RawImage> {
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(Error::invalid(format!("gaussian_blur: sigma {sigma} must be positive")));
    }
    let blurred = convolve(image, &gaussian_kernel(sigma))?;
    let format = image.format;
    image.with_data(blurred.into_iter().map(|v| format.clamp_sample(v)).collect())
}

/// Largest brightening, in lightness units.
const MAX_LIGHTEN: f32 = 10.0;
/// Largest darkening, in lightness units.
const MAX_DARKEN: f32 = 20.0;

/// Unsharp mask on the colour bands.
///
/// Differences from the blurred image up to `x1` lightness units are treated
/// as flat and left alone; larger ones are amplified by `m2`.
pub(crate) fn sharpen(image: &RawImage, sigma: f64, x1: f64, m2: f64) -> Result<RawImage> {
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(Error::invalid(format!("sharpen: sigma {sigma} must be positive")));
    }
    let blurred = convolve(image, &gaussian_kernel(sigma))?;
    let bands = image.bands as usize;
    let colour = image.colour_bands() as usize;
    // Lightness units per sample unit
    let scale = 100.0 / super::max_alpha_for(image.format, image.interpretation);
    let (x1, m2) = (x1 as f32, m2 as f32);
    let format = image.format;

    let data = super::map_samples(&image.data, |i, v| {
        if i % bands >= colour {
            return v;
        }
        let diff = (v - blurred[i]) * scale;
        let boost = if diff.abs() <= x1 {
            0.0
        } else {
            (m2 * (diff.abs() - x1) * diff.signum()).clamp(-MAX_DARKEN, MAX_LIGHTEN)
        };
        format.clamp_sample(v + boost / scale)
    });
    image.with_data(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandFormat, Interpretation};

    fn step(width: u32) -> RawImage {
        let data = (0..width).map(|x| if x < width / 2 { 50.0 } else { 200.0 }).collect();
        RawImage::new(width, 1, 1, BandFormat::UChar, Interpretation::BW, data).unwrap()
    }

    #[test]
    fn kernel_is_normalised() {
        let k = gaussian_kernel(1.5);
        assert_eq!(k.len(), 11);
        approx::assert_abs_diff_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert!(k[5] > k[4] && k[4] > k[3]);
    }

    #[test]
    fn blur_smooths_edges_and_keeps_flat_areas() {
        let out = gaussian_blur(&step(40), 2.0).unwrap();
        assert_eq!(out.data[0], 50.0);
        assert_eq!(out.data[39], 200.0);
        assert!(out.data[19] > 50.0 && out.data[20] < 200.0);
    }

    #[test]
    fn blur_rejects_zero_sigma() {
        assert!(matches!(gaussian_blur(&step(4), 0.0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn sharpen_boosts_edges() {
        let out = sharpen(&step(40), 1.0, 2.0, 3.0).unwrap();
        assert_eq!(out.data[0], 50.0);
        assert!(out.data[19] < 50.0);
        assert!(out.data[20] > 200.0);
    }

    #[test]
    fn sharpen_leaves_alpha() {
        let data = (0..8).flat_map(|x| [if x < 4 { 0.0 } else { 255.0 }, 255.0]).collect();
        let image = RawImage::new(8, 1, 2, BandFormat::UChar, Interpretation::BW, data).unwrap();
        let out = sharpen(&image, 1.0, 2.0, 3.0).unwrap();
        assert!(out.data.chunks(2).all(|px| px[1] == 255.0));
    }
}
