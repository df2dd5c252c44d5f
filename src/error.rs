//! Crate-wide error type.
//!
//! Every mutating operation returns [`Result`]; on error the image handle keeps
//! its previous native image. Engine warnings are not errors: they go through
//! the [logging handler](crate::logging) unless the caller asked loaders to
//! fail on them.

use crate::registry::ImageType;
use std::backtrace::Backtrace;
use thiserror::Error;

/// Result type for all pixform operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported image format")]
    UnsupportedImageFormat,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("engine failure: {message}")]
    EngineFailure {
        message: String,
        /// Stack captured where the failure was reported.
        stack: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot save to {0}")]
    CannotSave(ImageType),
    #[error("handle is closed")]
    Closed,
    #[error("runtime already started")]
    AlreadyStarted,
    #[error("runtime not started")]
    NotStarted,
    #[error("imaging engine {found} is older than the required {required}")]
    VersionMismatch { found: String, required: String },
}

impl Error {
    /// Build an [`Error::EngineFailure`], capturing the current stack.
    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Error::EngineFailure {
            message: message.into(),
            stack: Backtrace::capture().to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => Error::Io(io),
            other => Error::engine(other.to_string()),
        }
    }
}

impl From<lcms2::Error> for Error {
    fn from(err: lcms2::Error) -> Self {
        Error::engine(format!("colour management: {err}"))
    }
}
