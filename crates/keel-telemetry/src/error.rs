//! Telemetry errors.

use thiserror::Error;

/// Failure to configure or install logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A level, directive or format string did not parse.
    #[error("invalid logging setting: {0}")]
    InvalidSetting(String),

    /// A global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
