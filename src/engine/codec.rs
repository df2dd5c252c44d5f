//! Loaders and savers backed by the `image` crate.
//!
//! ## Crate mapping
//!
//! | Format | Load | Save |
//! |---|---|---|
//! | JPEG | `ImageReader` + `ImageDecoder::icc_profile` | `JpegEncoder::new_with_quality` |
//! | PNG | `ImageReader` | `PngEncoder::new_with_quality` |
//! | GIF | `GifDecoder::into_frames` (pages stacked vertically) | `GifEncoder` (animated when paged) |
//! | TIFF | `ImageReader` | `TiffEncoder` |
//! | WebP | `ImageReader` | `WebPEncoder::new_lossless` |
//! | HEIF/AVIF | none | `AvifEncoder::new_with_speed_quality` |
//!
//! BMP is readable by the `image` crate but has no loader here; the import
//! pipeline transcodes it to PNG first. AVIF decoding needs a C library, so
//! HEIF has a saver and no loader.

use super::{Metadata, RawImage, resample};
use crate::error::{Error, Result};
use crate::exif;
use crate::logging::{log_debug, log_info, log_warn};
use crate::params::{ExportParams, MAX_EFFORT, SubsampleMode, TiffCompression};
use crate::registry::ImageType;
use crate::types::{BandFormat, Interpretation};
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{
    AnimationDecoder, DynamicImage, Frame, GrayAlphaImage, GrayImage, ImageBuffer, ImageDecoder,
    ImageEncoder, ImageFormat, ImageReader, Luma, LumaA, Rgb, RgbImage, Rgba, RgbaImage,
};
use std::io::Cursor;

/// A named decoder and the import options it understands.
#[derive(Debug)]
pub(crate) struct Loader {
    pub name: &'static str,
    format: ImageFormat,
    pub accepts_shrink: bool,
    pub accepts_pages: bool,
}

const LOADERS: &[Loader] = &[
    Loader {
        name: "jpeg",
        format: ImageFormat::Jpeg,
        accepts_shrink: true,
        accepts_pages: false,
    },
    Loader {
        name: "png",
        format: ImageFormat::Png,
        accepts_shrink: false,
        accepts_pages: false,
    },
    Loader {
        name: "gif",
        format: ImageFormat::Gif,
        accepts_shrink: false,
        accepts_pages: true,
    },
    Loader {
        name: "tiff",
        format: ImageFormat::Tiff,
        accepts_shrink: false,
        accepts_pages: false,
    },
    Loader {
        name: "webp",
        format: ImageFormat::WebP,
        accepts_shrink: true,
        accepts_pages: false,
    },
];

const SAVERS: &[&str] = &["jpeg", "png", "gif", "tiff", "webp", "heif"];

pub(crate) fn find_loader(name: &str) -> Option<&'static Loader> {
    LOADERS.iter().find(|l| l.name == name)
}

pub(crate) fn has_saver(name: &str) -> bool {
    SAVERS.contains(&name)
}

/// Options a loader was actually given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecodeOptions {
    pub fail_on_error: bool,
    pub shrink: u32,
    /// `-1` for every page.
    pub n_pages: i32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            fail_on_error: false,
            shrink: 1,
            n_pages: 1,
        }
    }
}

impl DecodeOptions {
    /// Log a loader warning, or fail when the caller asked for that.
    fn warn(&self, loader: &str, message: String) -> Result<()> {
        if self.fail_on_error {
            return Err(Error::engine(format!("{loader}: {message}")));
        }
        log_warn!("{loader}: {message}");
        Ok(())
    }
}

/// Decode `buf` with `loader`.
pub(crate) fn decode(loader: &Loader, buf: &[u8], opts: &DecodeOptions) -> Result<RawImage> {
    let mut image = if loader.accepts_pages && opts.n_pages != 1 {
        decode_pages(loader, buf, opts)?
    } else {
        decode_single(loader, buf, opts)?
    };

    if loader.accepts_shrink && opts.shrink > 1 {
        image = resample::box_shrink(&image, opts.shrink)?;
    }

    image.meta.loader = Some(loader.name);
    match loader.format {
        ImageFormat::Jpeg => {
            image.meta.exif = exif::find_jpeg_exif(buf).map(<[u8]>::to_vec);
            image.meta.orientation = exif::read_orientation(buf);
        }
        ImageFormat::Tiff => image.meta.orientation = exif::read_orientation(buf),
        _ => {}
    }
    log_debug!("{}: decoded {}", loader.name, image.describe());
    Ok(image)
}

fn decode_single(loader: &Loader, buf: &[u8], opts: &DecodeOptions) -> Result<RawImage> {
    let mut decoder = ImageReader::with_format(Cursor::new(buf), loader.format).into_decoder()?;
    let icc_profile = match decoder.icc_profile() {
        Ok(profile) => profile,
        Err(e) => {
            opts.warn(loader.name, format!("unreadable ICC profile: {e}"))?;
            None
        }
    };
    let dynamic = DynamicImage::from_decoder(decoder)?;
    let mut image = from_dynamic(dynamic)?;
    image.meta.icc_profile = icc_profile;
    image.meta.n_pages = 1;
    Ok(image)
}

fn decode_pages(loader: &Loader, buf: &[u8], opts: &DecodeOptions) -> Result<RawImage> {
    let frames = GifDecoder::new(Cursor::new(buf))?
        .into_frames()
        .collect_frames()?;
    let available = frames.len();
    if available == 0 {
        return Err(Error::engine("no frames in file"));
    }

    let wanted = if opts.n_pages < 0 {
        available
    } else {
        let wanted = opts.n_pages as usize;
        if wanted > available {
            opts.warn(
                loader.name,
                format!("requested {wanted} pages, file has {available}"),
            )?;
        }
        wanted.min(available)
    };

    let (width, page_height) = frames[0].buffer().dimensions();
    let mut data = Vec::with_capacity(width as usize * page_height as usize * 4 * wanted);
    for frame in frames.into_iter().take(wanted) {
        let buffer = frame.into_buffer();
        if buffer.dimensions() != (width, page_height) {
            return Err(Error::engine("frames differ in size"));
        }
        data.extend(buffer.into_raw().into_iter().map(f32::from));
    }

    let mut image = RawImage::new(
        width,
        page_height * wanted as u32,
        4,
        BandFormat::UChar,
        Interpretation::Srgb,
        data,
    )?;
    image.meta.page_height = Some(page_height);
    image.meta.n_pages = available as u32;
    Ok(image)
}

fn widen<T: Copy + Into<f32>>(samples: &[T]) -> Vec<f32> {
    samples.iter().map(|&s| s.into()).collect()
}

/// Convert a decoded image into a native image.
pub(crate) fn from_dynamic(dynamic: DynamicImage) -> Result<RawImage> {
    use BandFormat::{UChar, UShort};
    use Interpretation::{BW, Grey16, Rgb16, Srgb};

    let (w, h) = (dynamic.width(), dynamic.height());
    let (bands, format, interpretation, data) = match dynamic {
        DynamicImage::ImageLuma8(b) => (1, UChar, BW, widen(b.as_raw())),
        DynamicImage::ImageLumaA8(b) => (2, UChar, BW, widen(b.as_raw())),
        DynamicImage::ImageRgb8(b) => (3, UChar, Srgb, widen(b.as_raw())),
        DynamicImage::ImageRgba8(b) => (4, UChar, Srgb, widen(b.as_raw())),
        DynamicImage::ImageLuma16(b) => (1, UShort, Grey16, widen(b.as_raw())),
        DynamicImage::ImageLumaA16(b) => (2, UShort, Grey16, widen(b.as_raw())),
        DynamicImage::ImageRgb16(b) => (3, UShort, Rgb16, widen(b.as_raw())),
        DynamicImage::ImageRgba16(b) => (4, UShort, Rgb16, widen(b.as_raw())),
        DynamicImage::ImageRgb32F(b) => {
            let data = b.as_raw().iter().map(|v| v * 255.0).collect();
            (3, BandFormat::Float, Srgb, data)
        }
        other => (4, UChar, Srgb, widen(other.to_rgba8().as_raw())),
    };
    RawImage::new(w, h, bands, format, interpretation, data)
}

fn narrow_u8(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect()
}

fn narrow_u16(samples: &[f32]) -> Vec<u16> {
    samples
        .iter()
        .map(|v| v.round().clamp(0.0, 65535.0) as u16)
        .collect()
}

/// Convert a native image into an `image` crate buffer.
///
/// 16-bit images stay 16-bit; everything else is clamped to 8 bits.
pub(crate) fn to_dynamic(image: &RawImage) -> Result<DynamicImage> {
    let (w, h) = (image.width, image.height);
    let sixteen = image.format == BandFormat::UShort;
    let dynamic = match (image.bands, sixteen) {
        (1, false) => GrayImage::from_raw(w, h, narrow_u8(&image.data)).map(DynamicImage::ImageLuma8),
        (2, false) => {
            GrayAlphaImage::from_raw(w, h, narrow_u8(&image.data)).map(DynamicImage::ImageLumaA8)
        }
        (3, false) => RgbImage::from_raw(w, h, narrow_u8(&image.data)).map(DynamicImage::ImageRgb8),
        (4, false) => RgbaImage::from_raw(w, h, narrow_u8(&image.data)).map(DynamicImage::ImageRgba8),
        (1, true) => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, narrow_u16(&image.data))
            .map(DynamicImage::ImageLuma16),
        (2, true) => ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, narrow_u16(&image.data))
            .map(DynamicImage::ImageLumaA16),
        (3, true) => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, narrow_u16(&image.data))
            .map(DynamicImage::ImageRgb16),
        (4, true) => ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, narrow_u16(&image.data))
            .map(DynamicImage::ImageRgba16),
        (bands, _) => {
            return Err(Error::engine(format!("cannot encode {bands} bands")));
        }
    };
    dynamic.ok_or_else(|| Error::engine("pixel buffer does not match image size"))
}

/// GIF quantizer speed, 30 (fastest) down to 1 as effort rises.
fn gif_speed(effort: u8) -> i32 {
    30 - i32::from(effort.min(MAX_EFFORT)) * 29 / i32::from(MAX_EFFORT)
}

/// AVIF encoder speed, 10 (fastest) down to 1 as effort rises.
fn avif_speed(effort: u8) -> u8 {
    10 - effort.min(MAX_EFFORT) * 9 / MAX_EFFORT
}

/// APP1 payload to write for `meta`: the source EXIF with its orientation
/// brought in line, or a bare orientation tag when there is no EXIF block.
fn jpeg_exif(meta: &Metadata) -> Option<Vec<u8>> {
    match (&meta.exif, meta.orientation) {
        (Some(block), orientation) => Some(exif::exif_payload(&exif::rewrite_orientation(block, orientation))),
        (None, Some(orientation)) => Some(exif::orientation_payload(orientation)),
        (None, None) => None,
    }
}

/// Encode `image`. `params` must already be resolved.
pub(crate) fn encode(image: &RawImage, params: &ExportParams) -> Result<Vec<u8>> {
    let dynamic = to_dynamic(image)?;
    let quality = params.quality.unwrap_or_default().value() as u8;
    let icc = if params.strip_profile {
        None
    } else {
        image.meta.icc_profile.clone()
    };

    let mut out = Vec::new();
    match params.format {
        ImageType::Jpeg => {
            if params.interlaced {
                log_info!("jpeg: progressive output unavailable, writing baseline");
            }
            if params.subsample == SubsampleMode::Off {
                log_info!("jpeg: chroma subsampling cannot be disabled");
            }
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            attach_profile(&mut encoder, icc, "jpeg");
            let flat = if image.colour_bands() == 1 {
                DynamicImage::ImageLuma8(dynamic.to_luma8())
            } else {
                DynamicImage::ImageRgb8(dynamic.to_rgb8())
            };
            flat.write_with_encoder(encoder)?;

            if !params.strip_metadata
                && let Some(payload) = jpeg_exif(&image.meta)
            {
                match exif::insert_jpeg_app1(&out, &payload) {
                    Some(tagged) => out = tagged,
                    None => log_warn!("jpeg: {} byte EXIF block does not fit in a segment, dropped", payload.len()),
                }
            }
        }
        ImageType::Png => {
            if params.interlaced {
                log_info!("png: interlaced output unavailable, writing non-interlaced");
            }
            let compression = match params.compression.unwrap_or(6) {
                0..=2 => CompressionType::Fast,
                3..=6 => CompressionType::Default,
                _ => CompressionType::Best,
            };
            let mut encoder = PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive);
            attach_profile(&mut encoder, icc, "png");
            dynamic.write_with_encoder(encoder)?;
        }
        ImageType::Webp => {
            if !params.lossless {
                log_info!("webp: lossy output unavailable, writing lossless");
            }
            let mut encoder = WebPEncoder::new_lossless(&mut out);
            attach_profile(&mut encoder, icc, "webp");
            eight_bit_colour(&dynamic).write_with_encoder(encoder)?;
        }
        ImageType::Tiff => {
            if params.tiff_compression != TiffCompression::None {
                log_debug!("tiff: writing uncompressed");
            }
            let mut cursor = Cursor::new(Vec::new());
            let tiff_ready = match dynamic {
                DynamicImage::ImageLumaA8(_) => DynamicImage::ImageRgba8(dynamic.to_rgba8()),
                DynamicImage::ImageLumaA16(_) => DynamicImage::ImageRgba16(dynamic.to_rgba16()),
                other => other,
            };
            tiff_ready.write_with_encoder(TiffEncoder::new(&mut cursor))?;
            out = cursor.into_inner();
        }
        ImageType::Gif => {
            let speed = gif_speed(params.effort);
            let pages = image.page_count();
            let rgba = dynamic.to_rgba8();
            {
                let mut encoder = GifEncoder::new_with_speed(&mut out, speed);
                if pages > 1 {
                    encoder.set_repeat(Repeat::Infinite)?;
                    let page_height = image.height / pages;
                    let frames = (0..pages).map(|p| {
                        let page = image::imageops::crop_imm(&rgba, 0, p * page_height, image.width, page_height)
                            .to_image();
                        Frame::new(page)
                    });
                    encoder.encode_frames(frames)?;
                } else {
                    encoder.encode_frame(Frame::new(rgba))?;
                }
            }
        }
        ImageType::Heif => {
            let speed = avif_speed(params.effort);
            let quality = if params.lossless { 100 } else { quality };
            let encoder = AvifEncoder::new_with_speed_quality(&mut out, speed, quality);
            eight_bit_colour(&dynamic).write_with_encoder(encoder)?;
        }
        other => return Err(Error::CannotSave(other)),
    }

    log_debug!(
        "{}: encoded {}x{} into {} bytes",
        params.format,
        image.width,
        image.height,
        out.len()
    );
    Ok(out)
}

/// RGB or RGBA, 8 bits per sample.
fn eight_bit_colour(dynamic: &DynamicImage) -> DynamicImage {
    if dynamic.color().has_alpha() {
        DynamicImage::ImageRgba8(dynamic.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(dynamic.to_rgb8())
    }
}

fn attach_profile<E: ImageEncoder>(encoder: &mut E, icc: Option<Vec<u8>>, saver: &str) {
    if let Some(icc) = icc
        && encoder.set_icc_profile(icc).is_err()
    {
        log_debug!("{saver}: encoder cannot embed ICC profiles");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{camera_exif, encode_rgb, gradient_rgb};

    #[test]
    fn loader_table() {
        assert!(find_loader("jpeg").is_some_and(|l| l.accepts_shrink));
        assert!(find_loader("gif").is_some_and(|l| l.accepts_pages));
        assert!(find_loader("bmp").is_none());
        assert!(find_loader("heif").is_none());
        assert!(has_saver("heif"));
        assert!(!has_saver("pdf"));
    }

    #[test]
    fn decode_png_keeps_pixels() {
        let png = encode_rgb(&gradient_rgb(8, 4), ImageFormat::Png);
        let image = decode(find_loader("png").unwrap(), &png, &DecodeOptions::default()).unwrap();
        assert_eq!((image.width, image.height, image.bands), (8, 4, 3));
        assert_eq!(image.interpretation, Interpretation::Srgb);
        assert_eq!(image.meta.loader, Some("png"));
        let expected = gradient_rgb(8, 4);
        assert_eq!(image.pixel(5, 2), &expected.get_pixel(5, 2).0.map(f32::from)[..]);
    }

    #[test]
    fn jpeg_shrink_on_load() {
        let jpeg = encode_rgb(&gradient_rgb(64, 32), ImageFormat::Jpeg);
        let opts = DecodeOptions {
            shrink: 4,
            ..DecodeOptions::default()
        };
        let image = decode(find_loader("jpeg").unwrap(), &jpeg, &opts).unwrap();
        assert_eq!((image.width, image.height), (16, 8));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result = decode(
            find_loader("png").unwrap(),
            b"\x89PNG\r\n\x1a\nnot really",
            &DecodeOptions::default(),
        );
        assert!(matches!(result, Err(Error::EngineFailure { .. }) | Err(Error::Io(_))));
    }

    #[test]
    fn encode_png_round_trips_exactly() {
        let source = from_dynamic(DynamicImage::ImageRgb8(gradient_rgb(10, 6))).unwrap();
        let params = ExportParams::new(ImageType::Png).resolved(Interpretation::Srgb);
        let bytes = encode(&source, &params).unwrap();
        let back = decode(find_loader("png").unwrap(), &bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(back.data, source.data);
    }

    #[test]
    fn jpeg_export_keeps_orientation() {
        let mut source = from_dynamic(DynamicImage::ImageRgb8(gradient_rgb(10, 6))).unwrap();
        source.meta.orientation = Some(6);
        let params = ExportParams::new(ImageType::Jpeg).resolved(Interpretation::Srgb);
        let bytes = encode(&source, &params).unwrap();
        assert_eq!(exif::read_orientation(&bytes), Some(6));

        let stripped = ExportParams {
            strip_metadata: true,
            ..params
        };
        let bytes = encode(&source, &stripped).unwrap();
        assert_eq!(exif::read_orientation(&bytes), None);
    }

    #[test]
    fn effort_maps_onto_encoder_speed() {
        assert_eq!((gif_speed(0), gif_speed(6)), (30, 1));
        assert_eq!((avif_speed(0), avif_speed(6)), (10, 1));
        assert_eq!(avif_speed(200), 1);
        assert!((0..6).all(|e| gif_speed(e) > gif_speed(e + 1)));
    }

    #[test]
    fn jpeg_export_keeps_source_exif() {
        let tagged = exif::insert_jpeg_app1(
            &encode_rgb(&gradient_rgb(10, 6), ImageFormat::Jpeg),
            &exif::exif_payload(&camera_exif(6)),
        )
        .unwrap();
        let mut source = decode(find_loader("jpeg").unwrap(), &tagged, &DecodeOptions::default()).unwrap();
        assert_eq!(source.meta.exif.as_deref(), Some(&camera_exif(6)[..]));

        source.meta.orientation = Some(1);
        let params = ExportParams::new(ImageType::Jpeg).resolved(Interpretation::Srgb);
        let bytes = encode(&source, &params).unwrap();
        assert_eq!(exif::read_orientation(&bytes), Some(1));
        assert!(exif::find_jpeg_exif(&bytes).unwrap().windows(4).any(|w| w == b"Pix\0"));

        source.meta.exif = None;
        let bytes = encode(&source, &params).unwrap();
        assert_eq!(exif::find_jpeg_exif(&bytes), Some(&exif::orientation_payload(1)[6..]));
    }

    #[test]
    fn sixteen_bit_survives_conversion() {
        let source = RawImage::new(
            2,
            1,
            1,
            BandFormat::UShort,
            Interpretation::Grey16,
            vec![0.0, 65535.0],
        )
        .unwrap();
        let dynamic = to_dynamic(&source).unwrap();
        assert!(matches!(dynamic, DynamicImage::ImageLuma16(_)));
    }

    #[test]
    fn unsupported_saver() {
        let source = from_dynamic(DynamicImage::ImageRgb8(gradient_rgb(2, 2))).unwrap();
        let params = ExportParams::new(ImageType::Pdf).resolved(Interpretation::Srgb);
        assert!(matches!(
            encode(&source, &params),
            Err(Error::CannotSave(ImageType::Pdf))
        ));
    }

    #[test]
    fn paged_gif_round_trip() {
        let mut data = Vec::new();
        for page in 0..3u8 {
            for _ in 0..(4 * 2) {
                data.extend_from_slice(&[f32::from(page * 80), 0.0, 0.0, 255.0]);
            }
        }
        let mut source =
            RawImage::new(4, 6, 4, BandFormat::UChar, Interpretation::Srgb, data).unwrap();
        source.meta.page_height = Some(2);

        let params = ExportParams::new(ImageType::Gif).resolved(Interpretation::Srgb);
        let bytes = encode(&source, &params).unwrap();

        let all = DecodeOptions {
            n_pages: -1,
            ..DecodeOptions::default()
        };
        let back = decode(find_loader("gif").unwrap(), &bytes, &all).unwrap();
        assert_eq!((back.width, back.height), (4, 6));
        assert_eq!(back.meta.page_height, Some(2));
        assert_eq!(back.meta.n_pages, 3);

        let too_many = DecodeOptions {
            n_pages: 5,
            fail_on_error: true,
            ..DecodeOptions::default()
        };
        assert!(decode(find_loader("gif").unwrap(), &bytes, &too_many).is_err());
    }
}
