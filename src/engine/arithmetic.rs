//! Per-pixel arithmetic.

use super::{RawImage, map_samples};
use crate::error::{Error, Result};
use crate::types::BandFormat;

/// `out = in * a + b`, per band.
///
/// `a` and `b` must have the same length, either one or the band count.
pub(crate) fn linear(image: &RawImage, a: &[f64], b: &[f64]) -> Result<RawImage> {
    if a.len() != b.len() {
        return Err(Error::invalid(format!(
            "linear: {} multipliers but {} offsets",
            a.len(),
            b.len()
        )));
    }
    let bands = image.bands as usize;
    if a.len() != 1 && a.len() != bands {
        return Err(Error::invalid(format!(
            "linear: {} constants for a {bands}-band image",
            a.len()
        )));
    }
    let format = image.format;
    let data = map_samples(&image.data, |i, v| {
        let k = if a.len() == 1 { 0 } else { i % bands };
        format.clamp_sample((f64::from(v) * a[k] + b[k]) as f32)
    });
    image.with_data(data)
}

/// Photographic negative of the colour bands.
pub(crate) fn invert(image: &RawImage) -> Result<RawImage> {
    let bands = image.bands as usize;
    let colour = image.colour_bands() as usize;
    let max = super::max_alpha_for(image.format, image.interpretation);
    let format = image.format;
    let data = map_samples(&image.data, |i, v| {
        if i % bands < colour {
            format.clamp_sample(max - v)
        } else {
            v
        }
    });
    image.with_data(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
        }
    }

    fn apply(self, left: f32, right: f32) -> f32 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Multiply => left * right,
            BinaryOp::Divide if right == 0.0 => 0.0,
            BinaryOp::Divide => left / right,
        }
    }
}

/// Combine two images of the same size sample by sample.
///
/// A one-band operand is applied to every band of the other. The result has
/// the left operand's header; division produces float samples, the other
/// operations keep the left band format and clamp.
pub(crate) fn binary(left: &RawImage, right: &RawImage, op: BinaryOp) -> Result<RawImage> {
    if left.width != right.width || left.height != right.height {
        return Err(Error::invalid(format!(
            "{}: {}x{} and {}x{} differ in size",
            op.name(),
            left.width,
            left.height,
            right.width,
            right.height
        )));
    }
    let bands = left.bands.max(right.bands);
    if left.bands != right.bands && left.bands != 1 && right.bands != 1 {
        return Err(Error::invalid(format!(
            "{}: cannot combine {} and {} bands",
            op.name(),
            left.bands,
            right.bands
        )));
    }
    let format = match op {
        BinaryOp::Divide => BandFormat::Float,
        _ => left.format,
    };
    let sample = |image: &RawImage, pixel: usize, band: usize| {
        let b = image.bands as usize;
        image.data[pixel * b + if b == 1 { 0 } else { band }]
    };
    let pixels = left.width as usize * left.height as usize;
    let n = bands as usize;
    let data: Vec<f32> = (0..pixels * n)
        .map(|i| {
            let (p, b) = (i / n, i % n);
            format.clamp_sample(op.apply(sample(left, p, b), sample(right, p, b)))
        })
        .collect();
    let mut out = left.like(left.width, left.height, bands, data)?;
    out.format = format;
    if left.bands == 1 && bands > 1 {
        out.interpretation = right.interpretation;
    }
    Ok(out)
}
