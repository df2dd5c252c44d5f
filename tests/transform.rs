//! End-to-end tests: encoded bytes in, transform, encoded bytes out.
//!
//! Fixtures are generated in memory with the `image` crate and decoded again
//! with it to check what pixform wrote.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use pixform::{
    exif, runtime, sniff, Anchor, BandFormat, Direction, Extend, FlipDirection, ImageRef,
    ImageType, Interpretation, Kernel, ResizeStrategy, Transform,
};
use std::io::Cursor;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / (width - 1).max(1)) as u8,
            (y * 255 / (height - 1).max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

/// Coloured blocks with a distinct bottom-right corner.
fn shapes(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| match (x * 3 / width, y * 2 / height) {
        (0, 0) => Rgb([200, 30, 30]),
        (1, 0) => Rgb([30, 200, 30]),
        (2, 0) => Rgb([30, 30, 200]),
        (0, 1) => Rgb([250, 250, 20]),
        (1, 1) => Rgb([20, 250, 250]),
        _ => Rgb([(x % 256) as u8, (y % 256) as u8, 99]),
    })
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn encode_rgb(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(image), format)
}

fn decode(bytes: &[u8]) -> DynamicImage {
    image::load_from_memory(bytes).unwrap()
}

fn open(bytes: &[u8]) -> ImageRef {
    ImageRef::new_from_buffer(bytes, None).unwrap()
}

// ---- scenarios ------------------------------------------------------------

#[test]
fn quarter_scale_of_large_jpeg() {
    let jpeg = encode_rgb(gradient(2560, 1600), ImageFormat::Jpeg);
    let (bytes, meta) = Transform::new()
        .load_buffer(jpeg)
        .scale(0.25)
        .run()
        .unwrap();

    assert!(!bytes.is_empty());
    assert_eq!(meta.format, ImageType::Jpeg);
    assert_eq!((meta.width, meta.height), (640, 400));
    let decoded = decode(&bytes);
    assert_eq!((decoded.width(), decoded.height()), (640, 400));
}

#[test]
fn crop_at_source_size_keeps_bottom_right_pixel() {
    let source = shapes(341, 256);
    let corner = *source.get_pixel(340, 255);
    let png = encode_rgb(source, ImageFormat::Png);

    let (bytes, meta) = Transform::new()
        .load_buffer(png)
        .resize(341, 256)
        .crop(Anchor::BottomRight)
        .run()
        .unwrap();

    assert_eq!(meta.format, ImageType::Png);
    let decoded = decode(&bytes).to_rgb8();
    assert_eq!(decoded.dimensions(), (341, 256));
    assert_eq!(*decoded.get_pixel(340, 255), corner);
}

#[test]
fn embed_pads_with_black() {
    let png = encode_rgb(RgbImage::from_pixel(100, 100, Rgb([240, 240, 240])), ImageFormat::Png);

    let mut image = open(&png);
    image.embed(50, 25, 200, 150, Extend::Black).unwrap();
    let decoded = decode(&image.export_png(None).unwrap().0).to_rgb8();
    assert_eq!(decoded.dimensions(), (200, 150));
    assert_eq!(*decoded.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_eq!(*decoded.get_pixel(49, 24), Rgb([0, 0, 0]));
    assert_eq!(*decoded.get_pixel(50, 25), Rgb([240, 240, 240]));
    assert_eq!(*decoded.get_pixel(149, 124), Rgb([240, 240, 240]));
    assert_eq!(*decoded.get_pixel(150, 125), Rgb([0, 0, 0]));

    // Through the planner the source is first enlarged to fit, then padded.
    let (bytes, _) = Transform::new()
        .resize(200, 150)
        .embed(Extend::Black)
        .apply_and_export(&open(&png))
        .unwrap();
    let decoded = decode(&bytes).to_rgb8();
    assert_eq!(decoded.dimensions(), (200, 150));
    assert_eq!(*decoded.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_eq!(*decoded.get_pixel(199, 75), Rgb([0, 0, 0]));
    let centre = decoded.get_pixel(100, 75);
    assert!(centre.0.iter().all(|&c| c >= 235), "centre {centre:?}");
}

#[test]
fn auto_rotate_applies_orientation_six() {
    let jpeg = encode_rgb(gradient(40, 20), ImageFormat::Jpeg);
    let tagged = exif::insert_jpeg_app1(&jpeg, &exif::orientation_payload(6)).unwrap();

    let mut image = open(&tagged);
    assert_eq!(image.orientation(), 6);
    image.auto_rotate().unwrap();
    assert_eq!((image.width(), image.height()), (20, 40));
    assert_eq!(image.orientation(), 1);

    let (bytes, meta) = Transform::new()
        .auto_rotate()
        .apply_and_export(&open(&tagged))
        .unwrap();
    assert_eq!((meta.width, meta.height), (20, 40));
    assert_eq!(meta.orientation, 1);
    assert_eq!(decode(&bytes).width(), 20);
}

#[test]
fn optimize_icc_profile_on_cmyk() {
    let png = encode_rgb(gradient(16, 16), ImageFormat::Png);
    let mut image = open(&png);
    image.to_colour_space(Interpretation::Cmyk).unwrap();
    assert_eq!(image.interpretation(), Some(Interpretation::Cmyk));
    assert_eq!(image.bands(), 4);

    image.optimize_icc_profile().unwrap();
    assert_eq!(image.interpretation(), Some(Interpretation::Srgb));
    assert_eq!(image.bands(), 3);
    assert!(image.has_icc_profile());
}

#[test]
fn max_scale_prevents_enlargement() {
    let png = encode_rgb(gradient(100, 100), ImageFormat::Png);
    let out = Transform::new()
        .resize(100_000, 100_000)
        .max_scale(1.0)
        .apply(&open(&png))
        .unwrap();
    assert_eq!((out.width(), out.height()), (100, 100));
}

#[test]
fn bmp_is_decoded_without_a_bmp_loader() {
    let bmp = encode_rgb(gradient(37, 21), ImageFormat::Bmp);
    assert_eq!(sniff(&bmp), ImageType::Bmp);
    let image = open(&bmp);
    assert_eq!((image.width(), image.height()), (37, 21));
    assert_eq!(image.bands(), 3);
}

// ---- properties -----------------------------------------------------------

#[test]
fn format_round_trip_keeps_dimensions() {
    let source = DynamicImage::ImageRgb8(gradient(48, 30));
    for (format, expected) in [
        (ImageFormat::Jpeg, ImageType::Jpeg),
        (ImageFormat::Png, ImageType::Png),
        (ImageFormat::Gif, ImageType::Gif),
        (ImageFormat::Tiff, ImageType::Tiff),
        (ImageFormat::WebP, ImageType::Webp),
    ] {
        let bytes = encode(&source, format);
        assert_eq!(sniff(&bytes), expected, "{format:?}");

        let image = open(&bytes);
        assert_eq!(image.format(), expected);
        let (out, meta) = image.export_native().unwrap();
        assert_eq!(meta.format, expected);
        assert_eq!(sniff(&out), expected);
        let decoded = decode(&out);
        assert_eq!((decoded.width(), decoded.height()), (48, 30), "{format:?}");
    }
}

#[test]
fn lossless_round_trip_is_exact() {
    let source = gradient(23, 17);
    let png = encode_rgb(source.clone(), ImageFormat::Png);
    let (out, _) = open(&png).export_png(None).unwrap();
    assert_eq!(decode(&out).to_rgb8(), source);
}

#[test]
fn auto_rotate_is_idempotent() {
    for orientation in 1..=8 {
        let jpeg = encode_rgb(gradient(30, 10), ImageFormat::Jpeg);
        let tagged = exif::insert_jpeg_app1(&jpeg, &exif::orientation_payload(orientation)).unwrap();

        let mut once = open(&tagged);
        once.auto_rotate().unwrap();
        let mut twice = once.copy().unwrap();
        twice.auto_rotate().unwrap();

        assert_eq!(once.orientation(), 1);
        assert_eq!(twice.orientation(), 1);
        assert_eq!((once.width(), once.height()), (twice.width(), twice.height()));
        assert_eq!(once.to_bytes().unwrap(), twice.to_bytes().unwrap(), "orientation {orientation}");
    }
}

#[test]
fn planner_output_dimensions() {
    let png = encode_rgb(gradient(120, 80), ImageFormat::Png);
    let source = open(&png);

    for (w, h) in [(60, 60), (100, 20), (30, 70), (120, 80), (240, 100)] {
        let embed = Transform::new().resize(w, h).embed(Extend::Copy).apply(&source).unwrap();
        assert!(embed.width() >= w && embed.height() >= h, "embed {w}x{h}");

        let stretch = Transform::new().resize(w, h).stretch().apply(&source).unwrap();
        assert_eq!((stretch.width(), stretch.height()), (w, h), "stretch {w}x{h}");

        if w <= 120 && h <= 80 {
            let crop = Transform::new().resize(w, h).crop(Anchor::Centre).apply(&source).unwrap();
            assert_eq!((crop.width(), crop.height()), (w, h), "crop {w}x{h}");
        }
    }
}

#[test]
fn max_scale_caps_every_strategy() {
    let png = encode_rgb(gradient(50, 40), ImageFormat::Png);
    let source = open(&png);
    let max = 1.5;
    for strategy in [ResizeStrategy::Auto, ResizeStrategy::Embed, ResizeStrategy::Crop, ResizeStrategy::Stretch] {
        let out = Transform::new()
            .resize(500, 90)
            .resize_strategy(strategy)
            .max_scale(max)
            .apply(&source)
            .unwrap();
        assert!(f64::from(out.width()) <= (max * 50.0).ceil(), "{strategy:?}: {}", out.width());
        assert!(f64::from(out.height()) <= (max * 40.0).ceil(), "{strategy:?}: {}", out.height());
    }
}

#[test]
fn premultiply_round_trip() {
    let rgba = RgbaImage::from_fn(9, 7, |x, y| Rgba([(x * 28) as u8, (y * 36) as u8, 77, (x * 30 + 10) as u8]));
    let png = encode(&DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
    let original = open(&png);

    let mut image = original.copy().unwrap();
    image.premultiply_alpha().unwrap();
    assert!(image.is_premultiplied());
    image.unpremultiply_alpha().unwrap();
    assert!(!image.is_premultiplied());
    assert_eq!(image.band_format(), Some(BandFormat::UChar));

    let before = original.to_bytes().unwrap();
    let after = image.to_bytes().unwrap();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert!(a.abs_diff(*b) <= 1, "{a} vs {b}");
    }
}

#[test]
fn empty_transform_is_a_no_op() {
    let png = encode_rgb(gradient(33, 21), ImageFormat::Png);
    let source = open(&png);
    let out = Transform::new().apply(&source).unwrap();
    assert_eq!((out.width(), out.height()), (33, 21));
    assert_eq!(out.band_format(), source.band_format());
    assert_eq!(out.to_bytes().unwrap(), source.to_bytes().unwrap());
}

#[test]
fn blur_then_flip_matches_manual_order() {
    let png = encode_rgb(shapes(40, 30), ImageFormat::Png);
    let source = open(&png);

    let planned = Transform::new()
        .gaussian_blur(1.5)
        .flip(FlipDirection::Horizontal)
        .apply(&source)
        .unwrap();

    let mut manual = source.copy().unwrap();
    manual.gaussian_blur(1.5).unwrap();
    manual.flip(Direction::Horizontal).unwrap();

    let planned = planned.to_bytes().unwrap();
    let manual = manual.to_bytes().unwrap();
    assert_eq!(planned.len(), manual.len());
    assert!(planned.iter().zip(&manual).all(|(a, b)| a.abs_diff(*b) <= 1));
}

#[test]
fn kernel_choice_changes_downscale() {
    let png = encode_rgb(shapes(90, 60), ImageFormat::Png);
    let source = open(&png);
    let nearest = Transform::new().resize_width(40).kernel(Kernel::Nearest).apply(&source).unwrap();
    let lanczos = Transform::new().resize_width(40).kernel(Kernel::Lanczos3).apply(&source).unwrap();
    assert_eq!((nearest.width(), nearest.height()), (lanczos.width(), lanczos.height()));
    assert_ne!(nearest.to_bytes().unwrap(), lanczos.to_bytes().unwrap());
}

#[test]
fn transform_starts_runtime_on_demand() {
    let png = encode_rgb(gradient(20, 20), ImageFormat::Png);
    let out = Transform::new().resize(10, 10).invert().apply(&open(&png)).unwrap();
    assert_eq!((out.width(), out.height()), (10, 10));
    assert!(runtime::is_running());
}

#[test]
fn oversized_targets_fail_cleanly() {
    assert!(matches!(ImageRef::black(u32::MAX, u32::MAX), Err(pixform::Error::InvalidArgument(_))));

    let png = encode_rgb(gradient(8, 8), ImageFormat::Png);
    let result = Transform::new().resize(u32::MAX, u32::MAX).apply(&open(&png));
    assert!(result.is_err());
    let result = Transform::new()
        .resize(u32::MAX, 4)
        .resize_strategy(ResizeStrategy::Stretch)
        .apply(&open(&png));
    assert!(result.is_err());
}
