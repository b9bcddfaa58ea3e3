//! Error types for the cvbridge crate.

use thiserror::Error;

use crate::native::NativeError;
use crate::types::Sentinel;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bridge operations.
///
/// Synchronous entry points return these directly. The fire-and-forget
/// invocation path folds them into a [`Sentinel`] via [`Error::sentinel`].
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter is missing, malformed, out of range or of the wrong shape.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Handle, file or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path points at a directory where a file was expected.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// No function is registered under the requested name.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// The handle table has no free slot left.
    #[error("handle capacity exceeded ({capacity} live handles)")]
    CapacityExceeded {
        /// Configured capacity of the table.
        capacity: usize,
    },

    /// The native call layer rejected or failed the call.
    #[error("native call failed: {0}")]
    Native(#[from] NativeError),

    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("generic failure: {0}")]
    GenericFailure(String),
}

impl Error {
    /// Short string code used by promise-style callers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParameter(_) => "EINVAL",
            Error::NotFound(_) => "ENOENT",
            Error::IsDirectory(_) => "EISDIR",
            Error::UnknownFunction(_) => "ENOSYS",
            Error::CapacityExceeded { .. } => "ENOSPC",
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => "ENOENT",
            Error::Native(_) | Error::Io(_) | Error::GenericFailure(_) => "EGENERIC",
        }
    }

    /// Fold this error into the sentinel used by the fire-and-forget path.
    ///
    /// Resolution failures report as `Security`, argument and handle
    /// failures as `Access`, anything raised while the native function
    /// itself ran as `InvocationTarget`.
    pub fn sentinel(&self) -> Sentinel {
        match self {
            Error::UnknownFunction(_) => Sentinel::Security,
            Error::InvalidParameter(_)
            | Error::NotFound(_)
            | Error::IsDirectory(_)
            | Error::CapacityExceeded { .. } => Sentinel::Access,
            Error::Native(e) => e.sentinel(),
            Error::Io(_) | Error::GenericFailure(_) => Sentinel::InvocationTarget,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is an invalid-parameter error.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::InvalidParameter(_))
    }

    /// Check if this is an unknown-function error.
    pub fn is_unknown_function(&self) -> bool {
        matches!(self, Error::UnknownFunction(_))
    }

    /// Check if this is a capacity error.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Error::CapacityExceeded { .. })
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => Error::Io(io),
            other => Error::GenericFailure(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidParameter(format!("malformed request: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidParameter(format!("malformed config: {}", err))
    }
}
