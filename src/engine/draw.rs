//! Rectangles, alpha compositing and text labels.

use super::{RawImage, font, map_rows};
use crate::error::{Error, Result};
use crate::types::{Align, BlendMode, Color};

fn ink_for(image: &RawImage, ink: &[f64]) -> Vec<f32> {
    (0..image.bands as usize)
        .map(|b| ink.get(b).or(ink.last()).copied().unwrap_or(0.0) as f32)
        .map(|v| image.format.clamp_sample(v))
        .collect()
}

/// Paint a rectangle, clipped to the image. Unfilled rectangles are a
/// one-pixel outline.
pub(crate) fn draw_rect(
    image: &RawImage,
    ink: &[f64],
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    fill: bool,
) -> Result<RawImage> {
    let ink = ink_for(image, ink);
    let bands = image.bands as usize;
    let (l, t) = (i64::from(left), i64::from(top));
    let (r, b) = (l + i64::from(width) - 1, t + i64::from(height) - 1);
    let inside = |x: i64, y: i64| {
        let within = x >= l && x <= r && y >= t && y <= b;
        within && (fill || x == l || x == r || y == t || y == b)
    };
    let data = map_rows(image.width, image.height, image.bands, |y, row| {
        let src = &image.data[image.index(0, y)..][..image.row_len()];
        row.copy_from_slice(src);
        if i64::from(y) < t || i64::from(y) > b {
            return;
        }
        for x in 0..image.width as usize {
            if inside(x as i64, i64::from(y)) {
                row[x * bands..(x + 1) * bands].copy_from_slice(&ink);
            }
        }
    })?;
    image.with_data(data)
}

fn separable(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => {
            if cb <= 0.5 {
                2.0 * cs * cb
            } else {
                1.0 - 2.0 * (1.0 - cs) * (1.0 - cb)
            }
        }
        BlendMode::Darken => cb.min(cs),
        BlendMode::Lighten => cb.max(cs),
        BlendMode::Difference => (cb - cs).abs(),
        BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
        _ => cs,
    }
}

/// Blend one normalised pixel. `cb`/`ab` is the base, `cs`/`as_` the
/// overlay; `out` receives the colour and the result alpha is returned.
fn blend(mode: BlendMode, cb: &[f32], ab: f32, cs: &[f32], as_: f32, out: &mut [f32]) -> f32 {
    let ar = match mode {
        BlendMode::Clear => 0.0,
        BlendMode::Source => as_,
        BlendMode::In => as_ * ab,
        BlendMode::Out => as_ * (1.0 - ab),
        BlendMode::Atop | BlendMode::Dest => ab,
        BlendMode::Xor => as_ * (1.0 - ab) + ab * (1.0 - as_),
        BlendMode::Add => (as_ + ab).min(1.0),
        _ => as_ + ab * (1.0 - as_),
    };
    for (i, o) in out.iter_mut().enumerate() {
        let (b, s) = (cb[i], cs[i]);
        *o = match mode {
            BlendMode::Clear => 0.0,
            BlendMode::Source | BlendMode::In | BlendMode::Out => s,
            BlendMode::Dest => b,
            BlendMode::Atop => as_ * s + b * (1.0 - as_),
            BlendMode::Over => {
                if ar > 0.0 {
                    (as_ * s + ab * b * (1.0 - as_)) / ar
                } else {
                    0.0
                }
            }
            BlendMode::DestOver => {
                if ar > 0.0 {
                    (ab * b + as_ * s * (1.0 - ab)) / ar
                } else {
                    0.0
                }
            }
            BlendMode::Xor => {
                if ar > 0.0 {
                    (as_ * s * (1.0 - ab) + ab * b * (1.0 - as_)) / ar
                } else {
                    0.0
                }
            }
            BlendMode::Add => {
                if ar > 0.0 {
                    ((as_ * s + ab * b) / ar).min(1.0)
                } else {
                    0.0
                }
            }
            _ => {
                if ar > 0.0 {
                    let mixed = as_ * (1.0 - ab) * s + as_ * ab * separable(mode, b, s) + (1.0 - as_) * ab * b;
                    mixed / ar
                } else {
                    0.0
                }
            }
        };
    }
    ar
}

/// Composite `overlay` onto `base` with its top-left corner at `x, y`.
///
/// Both images must have the same number of colour bands, except that a
/// one-band overlay is spread across all colour bands. The result always
/// carries an alpha band.
pub(crate) fn composite(base: &RawImage, overlay: &RawImage, mode: BlendMode, x: i32, y: i32) -> Result<RawImage> {
    let colour = base.colour_bands() as usize;
    let over_colour = overlay.colour_bands() as usize;
    if over_colour != colour && over_colour != 1 {
        return Err(Error::invalid(format!(
            "composite: {over_colour} colour band(s) cannot go over {colour}"
        )));
    }
    let out_bands = colour + 1;
    let base_max = base.max_alpha();
    let over_max = overlay.max_alpha();
    let base_unit = super::max_alpha_for(base.format, base.interpretation);
    let over_unit = super::max_alpha_for(overlay.format, overlay.interpretation);

    let data = map_rows(base.width, base.height, out_bands as u32, |row_y, row| {
        let mut cb = vec![0.0f32; colour];
        let mut cs = vec![0.0f32; colour];
        let mut co = vec![0.0f32; colour];
        for px in 0..base.width as usize {
            let bp = base.pixel(px as u32, row_y);
            for (i, c) in cb.iter_mut().enumerate() {
                *c = bp[i] / base_unit;
            }
            let ab = if base.has_alpha() { bp[colour] / base_max } else { 1.0 };

            let (ox, oy) = (px as i64 - i64::from(x), i64::from(row_y) - i64::from(y));
            let covered = (0..i64::from(overlay.width)).contains(&ox) && (0..i64::from(overlay.height)).contains(&oy);
            let as_ = if covered {
                let op = overlay.pixel(ox as u32, oy as u32);
                for (i, c) in cs.iter_mut().enumerate() {
                    *c = op[if over_colour == 1 { 0 } else { i }] / over_unit;
                }
                if overlay.has_alpha() { op[over_colour] / over_max } else { 1.0 }
            } else {
                cs.iter_mut().for_each(|c| *c = 0.0);
                0.0
            };

            let ar = blend(mode, &cb, ab.clamp(0.0, 1.0), &cs, as_.clamp(0.0, 1.0), &mut co);
            let out = &mut row[px * out_bands..(px + 1) * out_bands];
            for (o, c) in out.iter_mut().zip(&co) {
                *o = base.format.clamp_sample(c * base_unit);
            }
            out[colour] = base.format.clamp_sample(ar * base_max);
        }
    })?;
    base.like(base.width, base.height, out_bands as u32, data)
}

/// Text placement and appearance for [`label`].
#[derive(Debug, Clone)]
pub(crate) struct Label<'a> {
    pub text: &'a str,
    pub font_size: f64,
    pub box_width: u32,
    pub box_height: u32,
    pub left: i32,
    pub top: i32,
    pub opacity: f32,
    pub ink: Color,
    pub align: Align,
}

/// Draw text with the built-in face. Alpha, if any, is left as it was.
pub(crate) fn label(image: &RawImage, params: &Label<'_>) -> Result<RawImage> {
    if params.text.is_empty() {
        return Ok(image.duplicate());
    }
    let scale = (params.font_size / f64::from(font::GLYPH_HEIGHT)).round().max(1.0) as u32;
    let (mw, mh, mask) = font::render(params.text, scale, params.box_width.max(1), params.align)?;
    let mh = mh.min(params.box_height.max(1));

    let colour = image.colour_bands() as usize;
    let bands = image.bands as usize;
    let unit = super::max_alpha_for(image.format, image.interpretation) / 255.0;
    let rgb = [params.ink.r, params.ink.g, params.ink.b].map(|c| f32::from(c) * unit);
    let ink: Vec<f32> = if colour >= 3 {
        rgb.iter().copied().chain(std::iter::repeat(0.0)).take(colour).collect()
    } else {
        let grey = 0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2];
        vec![grey; colour]
    };
    let opacity = params.opacity.clamp(0.0, 1.0);

    let data = map_rows(image.width, image.height, image.bands, |y, row| {
        let src = &image.data[image.index(0, y)..][..image.row_len()];
        row.copy_from_slice(src);
        let my = i64::from(y) - i64::from(params.top);
        if !(0..i64::from(mh)).contains(&my) {
            return;
        }
        for x in 0..image.width as usize {
            let mx = x as i64 - i64::from(params.left);
            if !(0..i64::from(mw)).contains(&mx) {
                continue;
            }
            let coverage = mask[(my as usize) * mw as usize + mx as usize] * opacity;
            if coverage == 0.0 {
                continue;
            }
            for b in 0..colour {
                let v = &mut row[x * bands + b];
                *v = image.format.clamp_sample(*v * (1.0 - coverage) + ink[b] * coverage);
            }
        }
    })?;
    image.with_data(data)
}
