//! Import and export pipeline.
//!
//! Import sniffs the buffer, transcodes BMP to PNG when no BMP loader exists,
//! hands the loader only the options it understands and keeps the encoded
//! bytes alive next to the decoded image. Export fills parameter defaults,
//! moves the image into the target colour space, flattens against a
//! background when asked and dispatches to the format's saver.

use crate::engine::{self, RawImage, cache, codec, colour, conversion};
use crate::error::{Error, Result};
use crate::logging::{log_debug, log_error, log_info};
use crate::params::{ExportParams, ImportParams};
use crate::registry::{self, ImageType};
use crate::types::{BandFormat, Interpretation};
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Description of an encoded image returned with every export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub format: ImageType,
    pub width: u32,
    pub height: u32,
    pub colorspace: Interpretation,
    /// EXIF orientation, `0` when the image carries none.
    pub orientation: u16,
    pub pages: u32,
}

/// A decoded image plus what it was decoded from.
pub(crate) struct Loaded {
    pub image: Arc<RawImage>,
    pub format: ImageType,
    /// Encoded bytes, kept until the handle is closed.
    pub source: Option<Arc<[u8]>>,
}

fn load_name(image_type: ImageType) -> &'static str {
    match image_type {
        ImageType::Jpeg => "jpegload_buffer",
        ImageType::Png => "pngload_buffer",
        ImageType::Gif => "gifload_buffer",
        ImageType::Tiff => "tiffload_buffer",
        ImageType::Webp => "webpload_buffer",
        _ => "load_buffer",
    }
}

fn save_name(image_type: ImageType) -> &'static str {
    match image_type {
        ImageType::Jpeg => "jpegsave_buffer",
        ImageType::Png => "pngsave_buffer",
        ImageType::Gif => "gifsave_buffer",
        ImageType::Tiff => "tiffsave_buffer",
        ImageType::Webp => "webpsave_buffer",
        ImageType::Heif => "heifsave_buffer",
        _ => "save_buffer",
    }
}

/// Re-encode a BMP as PNG in memory.
fn transcode_bmp(buf: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(buf, ImageFormat::Bmp)?;
    let mut png = Cursor::new(Vec::new());
    decoded.write_to(&mut png, ImageFormat::Png)?;
    log_debug!("bmp: transcoded {} bytes to {} bytes of png", buf.len(), png.get_ref().len());
    Ok(png.into_inner())
}

/// Resolve which import options `loader` gets.
fn decode_options(loader: &codec::Loader, params: &ImportParams) -> codec::DecodeOptions {
    let mut opts = codec::DecodeOptions {
        fail_on_error: params.fail_on_error.unwrap_or(false),
        ..Default::default()
    };
    match params.shrink {
        Some(shrink) if loader.accepts_shrink => opts.shrink = shrink.max(1),
        Some(shrink) if shrink > 1 => log_debug!("{}: shrink-on-load not supported, ignoring {shrink}", loader.name),
        _ => {}
    }
    match params.n_pages {
        Some(pages) if loader.accepts_pages => opts.n_pages = pages,
        Some(pages) if pages != 1 => log_debug!("{}: page selection not supported, ignoring {pages}", loader.name),
        _ => {}
    }
    opts
}

/// Decode an encoded buffer.
pub(crate) fn load_buffer(buf: Arc<[u8]>, params: &ImportParams) -> Result<Loaded> {
    let mut format = registry::sniff(&buf);
    if format == ImageType::Unknown {
        return Err(Error::UnsupportedImageFormat);
    }

    let mut bytes = buf;
    if format == ImageType::Bmp && !registry::is_supported(ImageType::Bmp) {
        let png = engine::call_uncached("bmp2png", || transcode_bmp(&bytes))?;
        bytes = Arc::from(png);
        format = ImageType::Png;
    }

    let loader = codec::find_loader(format.name())
        .filter(|_| registry::is_supported(format))
        .ok_or_else(|| {
            log_debug!("no loader for {format}");
            Error::UnsupportedImageFormat
        })?;
    let opts = decode_options(loader, params);
    let image = engine::call_uncached(load_name(format), || codec::decode(loader, &bytes, &opts))?;
    Ok(Loaded {
        image: Arc::new(image),
        format,
        source: Some(bytes),
    })
}

/// Decode a file, reusing a cached decode of the same path, size and
/// modification time when file caching is enabled.
pub(crate) fn load_file(path: &Path, params: &ImportParams) -> Result<Loaded> {
    let stat = std::fs::metadata(path)?;
    let key = cache::file_key(path, stat.len(), stat.modified().ok(), &format!("{params:?}"));
    if let Some((image, source)) = cache::get_file(&key) {
        let format = image
            .meta
            .loader
            .and_then(|name| ImageType::ALL.iter().copied().find(|t| t.name() == name))
            .unwrap_or_default();
        log_debug!("{}: decode served from cache", path.display());
        return Ok(Loaded {
            image,
            format,
            source,
        });
    }

    let buf: Arc<[u8]> = Arc::from(std::fs::read(path)?);
    let loaded = load_buffer(buf, params)?;
    if let Some(source) = &loaded.source {
        cache::insert_file(key, Arc::clone(&loaded.image), Arc::clone(source));
    }
    Ok(loaded)
}

/// Sample scale of an 8-bit colour component in `image`.
fn colour_scale(image: &RawImage) -> f64 {
    f64::from(engine::max_alpha_for(image.format, image.interpretation)) / 255.0
}

/// Bring `image` into a band layout and sample format the savers accept.
fn encodable(mut image: Arc<RawImage>) -> Result<Arc<RawImage>> {
    let displayable = matches!(
        image.interpretation,
        Interpretation::Srgb | Interpretation::Rgb16 | Interpretation::BW | Interpretation::Grey16
    );
    if !displayable && image.interpretation.is_colorspace_supported() {
        log_info!("cannot encode {} pixels, converting to srgb", image.interpretation);
        image = engine::call("colourspace", &[&image], "srgb", || {
            colour::to_colourspace(&image, Interpretation::Srgb)
        })?;
    }
    if !matches!(image.format, BandFormat::UChar | BandFormat::UShort) {
        image = engine::call("cast", &[&image], "uchar", || conversion::cast(&image, BandFormat::UChar))?;
    }
    Ok(image)
}

/// Encode `image` according to `params`.
///
/// `original` is the format the handle was decoded from; it is used when
/// `params.format` is unknown, with JPEG as the last resort.
pub(crate) fn export(image: &Arc<RawImage>, original: ImageType, params: &ExportParams) -> Result<(Vec<u8>, ImageMetadata)> {
    let format = match (params.format, original) {
        (ImageType::Unknown, ImageType::Unknown) => ImageType::Jpeg,
        (ImageType::Unknown, original) => original,
        (format, _) => format,
    };
    if !registry::is_save_supported(format) {
        return Err(Error::CannotSave(format));
    }

    let mut working = Arc::clone(image);
    if params.strip_profile && working.meta.icc_profile.is_some() {
        working = engine::call_uncached("copy", || {
            let mut copy = working.duplicate();
            copy.meta.icc_profile = None;
            Ok(Arc::new(copy))
        })?;
    }

    let resolved = ExportParams {
        format,
        ..params.resolved(working.interpretation)
    };
    let target = resolved.interpretation.unwrap_or(working.interpretation);
    if working.interpretation.is_colorspace_supported() && target != working.interpretation {
        working = engine::call("colourspace", &[&working], target.as_str(), || {
            colour::to_colourspace(&working, target)
        })?;
    }

    if let Some(background) = resolved.background
        && working.has_alpha()
    {
        let scale = colour_scale(&working);
        let bg = [background.r, background.g, background.b].map(|c| f64::from(c) * scale);
        let bg = if working.colour_bands() == 1 {
            vec![0.2126 * bg[0] + 0.7152 * bg[1] + 0.0722 * bg[2]]
        } else {
            bg.to_vec()
        };
        working = engine::call("flatten", &[&working], &format!("{bg:?}"), || conversion::flatten(&working, &bg))?;
    }

    let working = encodable(working)?;
    let bytes = engine::call_uncached(save_name(format), || codec::encode(&working, &resolved))
        .inspect_err(|e| log_error!("{format}: encode of {}x{} failed: {e}", working.width, working.height))?;
    let metadata = ImageMetadata {
        format,
        width: working.width,
        height: working.height,
        colorspace: working.interpretation,
        orientation: working.meta.orientation.unwrap_or(0),
        pages: working.page_count(),
    };
    Ok((bytes, metadata))
}
