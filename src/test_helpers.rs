//! Shared test utilities for the pixform test suite.
//!
//! Provides synthetic pixel sources and encoded fixtures built in memory, so
//! no test depends on files checked into the repository.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! ensure_started();
//! let jpeg = jpeg_with_orientation(40, 20, 6);
//! let image = ImageRef::new_from_buffer(&jpeg, None).unwrap();
//! assert_eq!(image.orientation(), 6);
//! ```

use crate::engine::RawImage;
use crate::exif;
use crate::runtime;
use crate::types::{BandFormat, Interpretation};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

// =========================================================================
// Runtime
// =========================================================================

/// Start the runtime with defaults. Unit tests share one process-wide
/// runtime and never shut it down.
pub fn ensure_started() {
    runtime::startup_if_needed();
}

// =========================================================================
// Pixel sources
// =========================================================================

/// Horizontal red ramp, vertical green ramp, constant blue.
pub fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(2).saturating_sub(1)) as u8,
            (y * 255 / height.max(2).saturating_sub(1)) as u8,
            128,
        ])
    })
}

/// Opaque red left half, fully transparent right half.
pub fn half_transparent_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// A uniform 8-bit sRGB raw image.
pub fn solid_srgb(width: u32, height: u32, rgb: [f32; 3]) -> RawImage {
    let data = rgb.repeat(width as usize * height as usize);
    RawImage::new(width, height, 3, BandFormat::UChar, Interpretation::Srgb, data)
        .unwrap_or_else(|e| panic!("solid_srgb {width}x{height}: {e}"))
}

// =========================================================================
// Encoded fixtures
// =========================================================================

/// Encode an RGB buffer with the `image` crate.
pub fn encode_rgb(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .unwrap_or_else(|e| panic!("encode {format:?}: {e}"));
    out.into_inner()
}

/// Encode an RGBA buffer as PNG.
pub fn encode_rgba_png(image: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .unwrap_or_else(|e| panic!("encode rgba png: {e}"));
    out.into_inner()
}

/// A gradient JPEG carrying an EXIF orientation tag.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let jpeg = encode_rgb(&gradient_rgb(width, height), ImageFormat::Jpeg);
    exif::insert_jpeg_app1(&jpeg, &exif::orientation_payload(orientation))
        .unwrap_or_else(|| panic!("could not insert orientation {orientation}"))
}

/// Big-endian TIFF-structured EXIF with a Make of "Pix" and an orientation.
pub fn camera_exif(orientation: u16) -> Vec<u8> {
    let mut tiff = b"MM\x00\x2A".to_vec();
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&2u16.to_be_bytes());
    tiff.extend_from_slice(&[0x01, 0x0F, 0x00, 0x02]);
    tiff.extend_from_slice(&4u32.to_be_bytes());
    tiff.extend_from_slice(b"Pix\0");
    tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03]);
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff
}

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_rgb(&gradient_rgb(width, height), ImageFormat::Bmp)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_rgb(&gradient_rgb(width, height), ImageFormat::Gif)
}

// =========================================================================
// Assertions
// =========================================================================

/// Assert two samples are within `tolerance`, with coordinates in the message.
pub fn assert_sample_near(image: &RawImage, x: u32, y: u32, band: usize, expected: f32, tolerance: f32) {
    let actual = image.pixel(x, y)[band];
    assert!(
        (actual - expected).abs() <= tolerance,
        "sample ({x}, {y})[{band}] = {actual}, expected {expected} ± {tolerance}"
    );
}
