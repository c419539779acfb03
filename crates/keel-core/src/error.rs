//! Core error types.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A plugin identity failed validation.
    #[error("invalid plugin id: {0}")]
    InvalidPluginId(String),

    /// A handler name did not match any known handler type.
    #[error("unknown handler type: {0}")]
    UnknownHandler(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
