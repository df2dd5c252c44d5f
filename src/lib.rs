//! # pixform
//!
//! An image transformation library: decode a still image, describe what it
//! should become (size, fit, crop anchor, rotation, filters, overlay text) and
//! encode the result.
//!
//! # Architecture
//!
//! ```text
//! bytes / file / stream ──► foreign (sniff + decode) ──► ImageRef
//!                                                           │
//!        Transform (builder) ──► blackboard (planner) ──────┤ resize, crop, embed,
//!                                                           │ zoom, flip, blur, ...
//!                                                           ▼
//!                             foreign (convert + flatten + encode) ──► bytes
//! ```
//!
//! Pixel work happens in the internal `engine`: immutable, reference-counted
//! raster images and a memoizing operation cache keyed by operation name,
//! inputs and parameters. [`ImageRef`] is the owning handle applications hold;
//! every operation replaces the handle's image with a new one.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`runtime`] | Process-wide start-up, shutdown, cache control and statistics |
//! | [`config`] | Runtime configuration, loadable from TOML |
//! | [`logging`] | Pluggable log handler and level filter |
//! | [`error`] | The crate's [`Error`] type |
//! | [`types`] | Enumerations, colours and [`Scalar`] dimensions |
//! | [`params`] | Import, export, label and transform parameter records |
//! | [`registry`] | Known formats, content sniffing and loader/saver support |
//! | [`exif`] | Minimal EXIF orientation reading and writing |
//! | [`image`] | The [`ImageRef`] handle and its operations |
//! | [`stream`] | Callback-driven [`Source`]s and [`Target`]s |
//! | [`transform`] | The declarative [`Transform`] builder and its planner |
//!
//! # Quick start
//!
//! ```no_run
//! use pixform::{runtime, Anchor, ImageRef, ImageType, Transform};
//!
//! runtime::startup(None);
//! let image = ImageRef::new_from_file("photo.jpg", None)?;
//! let (webp, meta) = Transform::new()
//!     .resize(300, 300)
//!     .crop(Anchor::Centre)
//!     .format(ImageType::Webp)
//!     .apply_and_export(&image)?;
//! println!("{}x{}, {} bytes", meta.width, meta.height, webp.len());
//! runtime::shutdown();
//! # Ok::<(), pixform::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod exif;
pub mod logging;
pub mod params;
pub mod registry;
pub mod runtime;
pub mod stream;
pub mod transform;
pub mod types;

pub(crate) mod engine;
mod foreign;
pub mod image;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
pub use foreign::ImageMetadata;
pub use crate::image::{ImageComposite, ImageRef};
pub use logging::{logging_settings, LogLevel};
pub use params::{
    ExportParams, GifExportParams, HeifExportParams, ImportParams, JpegExportParams, LabelParams,
    PngExportParams, Quality, Sharpening, SubsampleMode, TiffCompression, TiffExportParams,
    TransformParams, WebpExportParams,
};
pub use registry::{sniff, ImageType};
pub use stream::{Source, Target, Whence};
pub use transform::Transform;
pub use types::{
    Align, Anchor, Angle, BandFormat, BlendMode, Coding, Color, ColorRGBA, Direction, Extend,
    FlipDirection, Interesting, Interpolator, Interpretation, Kernel, ResizeStrategy, Scalar, Size,
};
