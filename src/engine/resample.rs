//! Resampling: separable kernel resize, box shrink, affine similarity and
//! smart-crop thumbnails.

use super::{RawImage, conversion, map_rows};
use crate::error::{Error, Result};
use crate::types::{Interesting, Interpolator, Kernel, Size};
use std::f64::consts::PI;

impl Kernel {
    /// Half-width of the kernel at unit scale.
    pub(crate) fn support(self) -> f64 {
        match self {
            Kernel::Nearest => 0.5,
            Kernel::Linear => 1.0,
            Kernel::Cubic | Kernel::Mitchell | Kernel::Lanczos2 => 2.0,
            Kernel::Lanczos3 => 3.0,
        }
    }

    pub(crate) fn weight(self, x: f64) -> f64 {
        let x = x.abs();
        match self {
            Kernel::Nearest => {
                if x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Kernel::Linear => (1.0 - x).max(0.0),
            Kernel::Cubic => bicubic(x, 0.0, 0.5),
            Kernel::Mitchell => bicubic(x, 1.0 / 3.0, 1.0 / 3.0),
            Kernel::Lanczos2 => lanczos(x, 2.0),
            Kernel::Lanczos3 => lanczos(x, 3.0),
        }
    }
}

/// Mitchell-Netravali family.
fn bicubic(x: f64, b: f64, c: f64) -> f64 {
    if x < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * x.powi(3) + (-18.0 + 12.0 * b + 6.0 * c) * x.powi(2) + (6.0 - 2.0 * b))
            / 6.0
    } else if x < 2.0 {
        ((-b - 6.0 * c) * x.powi(3)
            + (6.0 * b + 30.0 * c) * x.powi(2)
            + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn lanczos(x: f64, a: f64) -> f64 {
    if x < a { sinc(x) * sinc(x / a) } else { 0.0 }
}

/// Contributions of source samples to one output sample.
struct Taps {
    start: usize,
    weights: Vec<f32>,
}

fn taps(input: u32, output: u32, scale: f64, kernel: Kernel) -> Vec<Taps> {
    let stretch = if scale < 1.0 { 1.0 / scale } else { 1.0 };
    let support = kernel.support() * stretch;
    let last = i64::from(input) - 1;
    (0..output)
        .map(|o| {
            let centre = (f64::from(o) + 0.5) / scale - 0.5;
            if kernel == Kernel::Nearest {
                let i = (centre + 0.5).floor().clamp(0.0, last as f64) as usize;
                return Taps { start: i, weights: vec![1.0] };
            }
            let lo = ((centre - support).floor() as i64).clamp(0, last);
            let hi = ((centre + support).ceil() as i64).clamp(0, last);
            let mut weights: Vec<f64> = (lo..=hi)
                .map(|i| kernel.weight((i as f64 - centre) / stretch))
                .collect();
            let sum: f64 = weights.iter().sum();
            if sum.abs() > f64::EPSILON {
                weights.iter_mut().for_each(|w| *w /= sum);
            } else {
                weights = vec![0.0; weights.len()];
                let nearest = (centre.round() as i64).clamp(lo, hi) - lo;
                weights[nearest as usize] = 1.0;
            }
            Taps {
                start: lo as usize,
                weights: weights.into_iter().map(|w| w as f32).collect(),
            }
        })
        .collect()
}

fn scaled(size: u32, scale: f64) -> u32 {
    (f64::from(size) * scale).round().max(1.0) as u32
}

/// Resize by independent horizontal and vertical factors.
pub(crate) fn resize(image: &RawImage, hscale: f64, vscale: f64, kernel: Kernel) -> Result<RawImage> {
    if !(hscale > 0.0 && vscale > 0.0 && hscale.is_finite() && vscale.is_finite()) {
        return Err(Error::invalid(format!("resize: scale {hscale}x{vscale} must be positive")));
    }
    let bands = image.bands as usize;
    let (ow, oh) = (scaled(image.width, hscale), scaled(image.height, vscale));
    super::check_size(ow, oh, image.bands)?;
    let format = image.format;

    let htaps = taps(image.width, ow, hscale, kernel);
    let horizontal = map_rows(ow, image.height, image.bands, |y, row| {
        let src = &image.data[image.index(0, y)..][..image.row_len()];
        for (x, t) in htaps.iter().enumerate() {
            for b in 0..bands {
                let acc: f32 = t
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * src[(t.start + k) * bands + b])
                    .sum();
                row[x * bands + b] = acc;
            }
        }
    })?;

    let vtaps = taps(image.height, oh, vscale, kernel);
    let stride = ow as usize * bands;
    let data = map_rows(ow, oh, image.bands, |y, row| {
        let t = &vtaps[y as usize];
        for (i, out) in row.iter_mut().enumerate() {
            let acc: f32 = t
                .weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * horizontal[(t.start + k) * stride + i])
                .sum();
            *out = format.clamp_sample(acc);
        }
    })?;

    let mut out = image.like(ow, oh, image.bands, data)?;
    out.xres = image.xres * hscale;
    out.yres = image.yres * vscale;
    out.meta.page_height = image
        .meta
        .page_height
        .map(|ph| scaled(ph, vscale))
        .filter(|ph| oh % ph == 0);
    Ok(out)
}

/// Integer block-average shrink, rounding the output size up.
pub(crate) fn box_shrink(image: &RawImage, factor: u32) -> Result<RawImage> {
    if factor == 0 {
        return Err(Error::invalid("shrink: factor must be positive"));
    }
    if factor == 1 {
        return Ok(image.duplicate());
    }
    let bands = image.bands as usize;
    let ow = image.width.div_ceil(factor);
    let oh = image.height.div_ceil(factor);
    let data = map_rows(ow, oh, image.bands, |y, row| {
        let y0 = y * factor;
        let y1 = (y0 + factor).min(image.height);
        for x in 0..ow {
            let x0 = x * factor;
            let x1 = (x0 + factor).min(image.width);
            let count = ((x1 - x0) * (y1 - y0)) as f32;
            for b in 0..bands {
                let mut acc = 0.0f32;
                for sy in y0..y1 {
                    for sx in x0..x1 {
                        acc += image.pixel(sx, sy)[b];
                    }
                }
                row[x as usize * bands + b] = image.format.clamp_sample(acc / count);
            }
        }
    })?;
    let mut out = image.like(ow, oh, image.bands, data)?;
    out.meta.page_height = image.meta.page_height.map(|ph| ph.div_ceil(factor));
    Ok(out)
}

/// Interpolate the image at a fractional position.
///
/// Returns `false` when the position falls outside the image.
fn sample(image: &RawImage, x: f64, y: f64, kernel: Kernel, out: &mut [f32]) -> bool {
    let (w, h) = (f64::from(image.width), f64::from(image.height));
    if x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
        return false;
    }
    let bands = image.bands as usize;
    if kernel == Kernel::Nearest {
        let px = image.pixel(x.round().clamp(0.0, w - 1.0) as u32, y.round().clamp(0.0, h - 1.0) as u32);
        out.copy_from_slice(px);
        return true;
    }
    let support = kernel.support();
    let (x0, x1) = ((x - support).floor().max(0.0) as u32, (x + support).ceil().min(w - 1.0) as u32);
    let (y0, y1) = ((y - support).floor().max(0.0) as u32, (y + support).ceil().min(h - 1.0) as u32);
    out.iter_mut().for_each(|v| *v = 0.0);
    let mut total = 0.0f64;
    for sy in y0..=y1 {
        let wy = kernel.weight(f64::from(sy) - y);
        if wy == 0.0 {
            continue;
        }
        for sx in x0..=x1 {
            let wt = wy * kernel.weight(f64::from(sx) - x);
            if wt == 0.0 {
                continue;
            }
            total += wt;
            let px = image.pixel(sx, sy);
            for b in 0..bands {
                out[b] += (wt as f32) * px[b];
            }
        }
    }
    if total.abs() > f64::EPSILON {
        out.iter_mut().for_each(|v| *v = image.format.clamp_sample(*v / total as f32));
    }
    true
}

/// Affine parameters for [`similarity`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Similarity {
    pub scale: f64,
    /// Clockwise, degrees.
    pub angle: f64,
    pub idx: f64,
    pub idy: f64,
    pub odx: f64,
    pub ody: f64,
    pub interpolator: Interpolator,
}

impl Default for Similarity {
    fn default() -> Self {
        Self {
            scale: 1.0,
            angle: 0.0,
            idx: 0.0,
            idy: 0.0,
            odx: 0.0,
            ody: 0.0,
            interpolator: Interpolator::default(),
        }
    }
}

/// Scale and rotate, sizing the output to the transformed bounding box.
pub(crate) fn similarity(image: &RawImage, params: &Similarity, background: &[f64]) -> Result<RawImage> {
    if !(params.scale > 0.0 && params.scale.is_finite()) {
        return Err(Error::invalid(format!("similarity: scale {} must be positive", params.scale)));
    }
    let theta = params.angle.to_radians();
    let (a, b) = (params.scale * theta.cos(), -params.scale * theta.sin());
    let (c, d) = (params.scale * theta.sin(), params.scale * theta.cos());
    let forward = |x: f64, y: f64| {
        let (x, y) = (x + params.idx, y + params.idy);
        (a * x + b * y + params.odx, c * x + d * y + params.ody)
    };

    // Snap away trig noise so quarter turns land on whole pixels
    let snap = |v: f64| (v * 1e6).round() / 1e6;
    let (w, h) = (f64::from(image.width), f64::from(image.height));
    let corners = [forward(0.0, 0.0), forward(w, 0.0), forward(0.0, h), forward(w, h)]
        .map(|(x, y)| (snap(x), snap(y)));
    let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).floor();
    let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max).ceil();
    let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor();
    let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil();
    let ow = ((max_x - min_x).round() as u32).max(1);
    let oh = ((max_y - min_y).round() as u32).max(1);
    super::check_size(ow, oh, image.bands)?;

    let det = a * d - b * c;
    let kernel = params.interpolator.kernel();
    let bands = image.bands as usize;
    let fill: Vec<f32> = (0..bands)
        .map(|i| {
            if image.has_alpha() && i == bands - 1 {
                0.0
            } else {
                background.get(i).or(background.first()).copied().unwrap_or(0.0) as f32
            }
        })
        .collect();

    let data = map_rows(ow, oh, image.bands, |y, row| {
        let oy = f64::from(y) + 0.5 + min_y - params.ody;
        for x in 0..ow as usize {
            let ox = x as f64 + 0.5 + min_x - params.odx;
            let sx = (d * ox - b * oy) / det - params.idx - 0.5;
            let sy = (-c * ox + a * oy) / det - params.idy - 0.5;
            let out = &mut row[x * bands..(x + 1) * bands];
            if !sample(image, sx, sy, kernel, out) {
                out.copy_from_slice(&fill);
            }
        }
    })?;
    let mut out = image.like(ow, oh, image.bands, data)?;
    out.meta.page_height = None;
    Ok(out)
}

/// Downscale to fit `width x height`, cropping according to `interesting`.
///
/// With [`Interesting::None`] the whole image fits inside the box; any other
/// value fills the box and crops the overflow.
pub(crate) fn thumbnail(
    image: &RawImage,
    width: u32,
    height: u32,
    interesting: Interesting,
    size: Size,
) -> Result<RawImage> {
    if width == 0 || height == 0 {
        return Err(Error::invalid(format!("thumbnail: target {width}x{height} must be non-zero")));
    }
    let hscale = f64::from(width) / f64::from(image.width);
    let vscale = f64::from(height) / f64::from(image.height);
    let crop = interesting != Interesting::None;
    let (mut hs, mut vs) = match size {
        Size::Force => (hscale, vscale),
        _ if crop => (hscale.max(vscale), hscale.max(vscale)),
        _ => (hscale.min(vscale), hscale.min(vscale)),
    };
    match size {
        Size::Up if hs < 1.0 || vs < 1.0 => (hs, vs) = (1.0, 1.0),
        Size::Down if hs > 1.0 || vs > 1.0 => (hs, vs) = (1.0, 1.0),
        _ => {}
    }

    let resized = if (hs - 1.0).abs() < f64::EPSILON && (vs - 1.0).abs() < f64::EPSILON {
        image.duplicate()
    } else if image.has_alpha() {
        let restore = image.format;
        let pre = conversion::premultiply(image)?;
        let scaled = resize(&pre, hs, vs, Kernel::Lanczos3)?;
        conversion::unpremultiply(&scaled, restore)?
    } else {
        resize(image, hs, vs, Kernel::Lanczos3)?
    };

    if !crop || (resized.width <= width && resized.height <= height) {
        return Ok(resized);
    }
    let (cw, ch) = (width.min(resized.width), height.min(resized.height));
    let (left, top) = crop_position(&resized, cw, ch, interesting);
    conversion::extract_area(&resized, left, top, cw, ch)
}

fn crop_position(image: &RawImage, cw: u32, ch: u32, interesting: Interesting) -> (u32, u32) {
    let (ex, ey) = (image.width - cw, image.height - ch);
    match interesting {
        Interesting::Low => (0, 0),
        Interesting::High => (ex, ey),
        Interesting::Entropy | Interesting::Attention => {
            let score = |left: u32, top: u32| match interesting {
                Interesting::Entropy => window_entropy(image, left, top, cw, ch),
                _ => window_attention(image, left, top, cw, ch),
            };
            let steps = 16;
            let candidates = (0..=steps).map(|i| (ex * i / steps, ey * i / steps));
            let mut best = (ex / 2, ey / 2);
            let mut best_score = score(best.0, best.1);
            for (left, top) in candidates {
                let s = score(left, top);
                if s > best_score + 1e-9 {
                    best = (left, top);
                    best_score = s;
                }
            }
            best
        }
        _ => (ex / 2, ey / 2),
    }
}

fn luma(image: &RawImage, x: u32, y: u32) -> f64 {
    let px = image.pixel(x, y);
    let range = image.format.range().map_or(1.0, |(_, hi)| f64::from(hi));
    let v = if image.colour_bands() >= 3 {
        0.2126 * f64::from(px[0]) + 0.7152 * f64::from(px[1]) + 0.0722 * f64::from(px[2])
    } else {
        f64::from(px[0])
    };
    (v / range).clamp(0.0, 1.0)
}

/// Shannon entropy of the luma histogram.
fn window_entropy(image: &RawImage, left: u32, top: u32, w: u32, h: u32) -> f64 {
    let mut histogram = [0u64; 256];
    for y in top..top + h {
        for x in left..left + w {
            histogram[(luma(image, x, y) * 255.0).round() as usize] += 1;
        }
    }
    let total = f64::from(w) * f64::from(h);
    histogram
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Mean edge strength plus saturation.
fn window_attention(image: &RawImage, left: u32, top: u32, w: u32, h: u32) -> f64 {
    let mut total = 0.0;
    for y in top..top + h {
        for x in left..left + w {
            let here = luma(image, x, y);
            let right = if x + 1 < image.width { luma(image, x + 1, y) } else { here };
            let below = if y + 1 < image.height { luma(image, x, y + 1) } else { here };
            total += (right - here).abs() + (below - here).abs();
            if image.colour_bands() >= 3 {
                let px = image.pixel(x, y);
                let range = image.format.range().map_or(1.0, |(_, hi)| hi);
                let max = px[..3].iter().copied().fold(f32::MIN, f32::max);
                let min = px[..3].iter().copied().fold(f32::MAX, f32::min);
                total += f64::from((max - min) / range);
            }
        }
    }
    total / (f64::from(w) * f64::from(h))
}
