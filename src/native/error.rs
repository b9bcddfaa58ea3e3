//! Failures raised inside native functions.

use thiserror::Error;

use crate::types::Sentinel;

/// Result type for native functions.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Error raised by the native call layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NativeError {
    /// An argument made it past coercion but the function cannot use it.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Operands do not agree in size or type.
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// The operation does not support this input.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The function ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl NativeError {
    /// Sentinel reported for this failure in the fire-and-forget path.
    pub fn sentinel(&self) -> Sentinel {
        match self {
            NativeError::BadArgument(_) => Sentinel::Access,
            NativeError::SizeMismatch(_) | NativeError::Unsupported(_) | NativeError::Failed(_) => {
                Sentinel::InvocationTarget
            }
        }
    }
}
