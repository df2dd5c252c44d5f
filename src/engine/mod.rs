//! Built-in imaging engine.
//!
//! A native image ([`RawImage`]) is an immutable, reference-counted pixel
//! buffer: interleaved `f32` samples held in the nominal range of the band
//! format, plus header fields and a metadata record. Operations never mutate
//! an image in place; they build a new one through [`call`], which checks
//! that the runtime is up, consults the operation cache and runs the kernel
//! on the engine thread pool.
//!
//! ## Modules
//!
//! | Module | Operations |
//! |---|---|
//! | [`codec`] | decode/encode through the `image` crate |
//! | [`cache`] | bounded SHA-256-keyed operation cache |
//! | [`conversion`] | extract, embed, flip, rotate, zoom, bands, cast, alpha |
//! | [`resample`] | kernel resize, shrink, similarity, thumbnail |
//! | [`convolution`] | gaussian blur, sharpen |
//! | [`arithmetic`] | linear, invert, add, multiply, divide |
//! | [`colour`] | colour-space conversion, ICC transforms, modulate |
//! | [`draw`] | rectangles, composite, labels |
//! | [`create`] | black, xyz, identity |

pub(crate) mod arithmetic;
pub(crate) mod cache;
pub(crate) mod codec;
pub(crate) mod colour;
pub(crate) mod conversion;
pub(crate) mod convolution;
pub(crate) mod create;
pub(crate) mod draw;
mod font;
pub(crate) mod resample;

use crate::error::{Error, Result};
use crate::runtime::{self, MemoryStats};
use crate::types::{BandFormat, Coding, Interpretation};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static ALLOCS: AtomicU64 = AtomicU64::new(0);
static MEM: AtomicU64 = AtomicU64::new(0);
static MEM_HIGH: AtomicU64 = AtomicU64::new(0);
static FILES: AtomicU64 = AtomicU64::new(0);

static LIVE: LazyLock<Mutex<BTreeMap<u64, String>>> = LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// Metadata carried alongside the pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// EXIF orientation, 1..=8.
    pub orientation: Option<u16>,
    pub icc_profile: Option<Vec<u8>>,
    /// Raw TIFF-structured EXIF block.
    pub exif: Option<Vec<u8>>,
    /// Height of one page when several pages are stacked vertically.
    pub page_height: Option<u32>,
    /// Pages the source file holds.
    pub n_pages: u32,
    /// Name of the loader that produced the image.
    pub loader: Option<&'static str>,
}

/// A native image.
#[derive(Debug)]
pub struct RawImage {
    id: u64,
    tracked: u64,
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub format: BandFormat,
    pub coding: Coding,
    pub interpretation: Interpretation,
    pub xres: f64,
    pub yres: f64,
    pub xoffset: i32,
    pub yoffset: i32,
    pub data: Vec<f32>,
    pub meta: Metadata,
}

impl RawImage {
    pub fn new(
        width: u32,
        height: u32,
        bands: u32,
        format: BandFormat,
        interpretation: Interpretation,
        data: Vec<f32>,
    ) -> Result<Self> {
        check_shape(width, height, bands, data.len())?;
        Ok(Self::track(RawImage {
            id: 0,
            tracked: 0,
            width,
            height,
            bands,
            format,
            coding: Coding::None,
            interpretation,
            xres: 1.0,
            yres: 1.0,
            xoffset: 0,
            yoffset: 0,
            data,
            meta: Metadata::default(),
        }))
    }

    /// A new image with this image's header and metadata but other pixels.
    pub fn like(&self, width: u32, height: u32, bands: u32, data: Vec<f32>) -> Result<Self> {
        check_shape(width, height, bands, data.len())?;
        Ok(Self::track(RawImage {
            id: 0,
            tracked: 0,
            width,
            height,
            bands,
            format: self.format,
            coding: self.coding,
            interpretation: self.interpretation,
            xres: self.xres,
            yres: self.yres,
            xoffset: self.xoffset,
            yoffset: self.yoffset,
            data,
            meta: self.meta.clone(),
        }))
    }

    /// A new image with the same shape and other pixels.
    pub fn with_data(&self, data: Vec<f32>) -> Result<Self> {
        self.like(self.width, self.height, self.bands, data)
    }

    /// An independent copy with its own identity.
    pub fn duplicate(&self) -> Self {
        Self::track(RawImage {
            id: 0,
            tracked: 0,
            data: self.data.clone(),
            meta: self.meta.clone(),
            ..*self
        })
    }

    /// Bytes held by the sample buffer. Samples are `f32` whatever the band format.
    pub(crate) fn bytes(&self) -> u64 {
        (self.data.len() * size_of::<f32>()) as u64
    }

    fn track(mut image: RawImage) -> RawImage {
        image.id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        image.tracked = image.bytes();

        ALLOCS.fetch_add(1, Ordering::Relaxed);
        let now = MEM.fetch_add(image.tracked, Ordering::Relaxed) + image.tracked;
        MEM_HIGH.fetch_max(now, Ordering::Relaxed);

        LIVE.lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(image.id, image.describe());
        image
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn describe(&self) -> String {
        format!(
            "#{} {}x{} {} band(s) {:?} {}",
            self.id, self.width, self.height, self.bands, self.format, self.interpretation
        )
    }

    pub fn has_alpha(&self) -> bool {
        match self.interpretation {
            Interpretation::BW | Interpretation::Grey16 => self.bands == 2,
            Interpretation::Cmyk => self.bands == 5,
            _ => self.bands == 4,
        }
    }

    /// Index of the first band that is not a colour band.
    pub fn colour_bands(&self) -> u32 {
        if self.has_alpha() {
            self.bands - 1
        } else {
            self.bands
        }
    }

    /// Value of a fully opaque alpha sample.
    pub fn max_alpha(&self) -> f32 {
        max_alpha_for(self.format, self.interpretation)
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize * self.width as usize) + x as usize) * self.bands as usize
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let i = self.index(x, y);
        &self.data[i..i + self.bands as usize]
    }

    pub fn row_len(&self) -> usize {
        self.width as usize * self.bands as usize
    }

    pub fn page_count(&self) -> u32 {
        match self.meta.page_height {
            Some(ph) if ph > 0 && self.height % ph == 0 => self.height / ph,
            _ => 1,
        }
    }
}

impl Drop for RawImage {
    fn drop(&mut self) {
        ALLOCS.fetch_sub(1, Ordering::Relaxed);
        MEM.fetch_sub(self.tracked, Ordering::Relaxed);
        LIVE.lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Opaque alpha for a band format and colour space.
pub(crate) fn max_alpha_for(format: BandFormat, interpretation: Interpretation) -> f32 {
    match format {
        BandFormat::UShort => 65535.0,
        _ => interpretation.max_alpha(),
    }
}

/// Largest width or height an image may have.
pub(crate) const MAX_COORD: u32 = 10_000_000;

/// Validate an output size and return its sample count.
pub(crate) fn check_size(width: u32, height: u32, bands: u32) -> Result<usize> {
    if width == 0 || height == 0 || bands == 0 {
        return Err(Error::invalid(format!("bad image dimensions {width}x{height}x{bands}")));
    }
    if width > MAX_COORD || height > MAX_COORD {
        return Err(Error::invalid(format!(
            "image dimensions {width}x{height} exceed the {MAX_COORD} pixel limit"
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(bands as usize))
        .ok_or_else(|| Error::invalid(format!("image of {width}x{height}x{bands} samples is too large")))
}

/// Allocate a zeroed sample buffer, failing instead of aborting when memory runs out.
pub(crate) fn alloc_samples(len: usize) -> Result<Vec<f32>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| Error::engine(format!("cannot allocate {len} samples: {e}")))?;
    data.resize(len, 0.0);
    Ok(data)
}

fn check_shape(width: u32, height: u32, bands: u32, len: usize) -> Result<()> {
    let expected = check_size(width, height, bands)?;
    if len != expected {
        return Err(Error::engine(format!(
            "buffer holds {len} samples, {width}x{height}x{bands} needs {expected}"
        )));
    }
    Ok(())
}

/// Run an operation through the cache and the engine pool.
///
/// `params` must capture every argument that influences the result; it is
/// hashed with the operation name and the input image ids into the cache key.
pub(crate) fn call<F>(name: &'static str, inputs: &[&RawImage], params: &str, op: F) -> Result<Arc<RawImage>>
where
    F: FnOnce() -> Result<RawImage> + Send,
{
    runtime::ensure_running()?;
    runtime::record_operation(name);

    let key = cache::key(name, inputs.iter().map(|i| i.id()), params);
    if let Some(hit) = cache::get(&key) {
        return Ok(hit);
    }

    let image = Arc::new(runtime::install(op).map_err(|e| annotate(name, e))?);
    cache::insert(key, name, Arc::clone(&image));
    Ok(image)
}

/// Run an operation on the engine pool without caching its result.
pub(crate) fn call_uncached<T, F>(name: &'static str, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    runtime::ensure_running()?;
    runtime::record_operation(name);
    runtime::install(op).map_err(|e| annotate(name, e))
}

fn annotate(name: &str, err: Error) -> Error {
    match err {
        Error::EngineFailure { message, stack } => Error::EngineFailure {
            message: format!("{name}: {message}"),
            stack,
        },
        other => other,
    }
}

/// Build an image row by row on the current pool.
///
/// The size is checked against [`MAX_COORD`] before anything is allocated.
pub(crate) fn map_rows<F>(width: u32, height: u32, bands: u32, f: F) -> Result<Vec<f32>>
where
    F: Fn(u32, &mut [f32]) + Sync + Send,
{
    let len = check_size(width, height, bands)?;
    let row_len = width as usize * bands as usize;
    let mut data = alloc_samples(len)?;
    data.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| f(y as u32, row));
    Ok(data)
}

/// Apply `f` to every sample, in parallel.
pub(crate) fn map_samples<F>(data: &[f32], f: F) -> Vec<f32>
where
    F: Fn(usize, f32) -> f32 + Sync + Send,
{
    data.par_iter().enumerate().map(|(i, &v)| f(i, v)).collect()
}

pub(crate) fn memory_stats() -> MemoryStats {
    MemoryStats {
        mem: MEM.load(Ordering::Relaxed),
        mem_high: MEM_HIGH.load(Ordering::Relaxed),
        files: FILES.load(Ordering::Relaxed),
        allocs: ALLOCS.load(Ordering::Relaxed),
    }
}

pub(crate) fn live_images() -> Vec<String> {
    LIVE.lock()
        .unwrap_or_else(|e| e.into_inner())
        .values()
        .cloned()
        .collect()
}

pub(crate) fn file_opened() {
    FILES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn file_closed() {
    FILES.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_checked() {
        let bad = RawImage::new(2, 2, 3, BandFormat::UChar, Interpretation::Srgb, vec![0.0; 11]);
        assert!(matches!(bad, Err(Error::EngineFailure { .. })));
        let empty = RawImage::new(0, 2, 3, BandFormat::UChar, Interpretation::Srgb, vec![]);
        assert!(empty.is_err());
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        assert!(matches!(check_size(u32::MAX, u32::MAX, 3), Err(Error::InvalidArgument(_))));
        assert!(matches!(check_size(MAX_COORD + 1, 1, 1), Err(Error::InvalidArgument(_))));
        assert_eq!(check_size(MAX_COORD, 1, 4).unwrap(), MAX_COORD as usize * 4);
        let rows = map_rows(MAX_COORD + 1, 1, 1, |_, _| {});
        assert!(matches!(rows, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn map_rows_fills_every_row() {
        let data = map_rows(3, 2, 2, |y, row| row.iter_mut().for_each(|v| *v = y as f32)).unwrap();
        assert_eq!(data, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn memory_counts_float_samples() {
        let image = RawImage::new(100, 100, 1, BandFormat::UChar, Interpretation::BW, vec![0.0; 10_000]).unwrap();
        assert_eq!(image.bytes(), 40_000);
        assert_eq!(image.tracked, 40_000);
        let wide = RawImage::new(10, 10, 3, BandFormat::UShort, Interpretation::Rgb16, vec![0.0; 300]).unwrap();
        assert_eq!(wide.bytes(), 1_200);
    }

    #[test]
    fn ids_are_unique() {
        let a = RawImage::new(1, 1, 1, BandFormat::UChar, Interpretation::BW, vec![0.0]).unwrap();
        let b = a.duplicate();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn alpha_detection() {
        let rgba = RawImage::new(1, 1, 4, BandFormat::UChar, Interpretation::Srgb, vec![0.0; 4]).unwrap();
        assert!(rgba.has_alpha());
        assert_eq!(rgba.colour_bands(), 3);
        let cmyk = RawImage::new(1, 1, 4, BandFormat::UChar, Interpretation::Cmyk, vec![0.0; 4]).unwrap();
        assert!(!cmyk.has_alpha());
        let ga = RawImage::new(1, 1, 2, BandFormat::UShort, Interpretation::Grey16, vec![0.0; 2]).unwrap();
        assert!(ga.has_alpha());
        assert_eq!(ga.max_alpha(), 65535.0);
    }

    #[test]
    fn live_images_are_tracked() {
        let image = RawImage::new(3, 3, 1, BandFormat::UChar, Interpretation::BW, vec![0.0; 9]).unwrap();
        let tag = format!("#{} ", image.id());
        assert!(live_images().iter().any(|d| d.starts_with(&tag)));
        assert!(memory_stats().allocs >= 1);
        drop(image);
        assert!(!live_images().iter().any(|d| d.starts_with(&tag)));
    }

    #[test]
    fn page_count_from_page_height() {
        let mut image = RawImage::new(2, 6, 1, BandFormat::UChar, Interpretation::BW, vec![0.0; 12]).unwrap();
        assert_eq!(image.page_count(), 1);
        image.meta.page_height = Some(2);
        assert_eq!(image.page_count(), 3);
        image.meta.page_height = Some(4);
        assert_eq!(image.page_count(), 1);
    }
}
