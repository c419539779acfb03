//! Configuration errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: io::Error,
    },

    /// A TOML document did not parse or did not match the schema.
    #[error("cannot parse {origin}: {source}")]
    Parse {
        /// The file path, or `<defaults>` for the embedded document.
        origin: String,
        /// TOML failure.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or otherwise unusable.
    #[error("invalid `{field}`: {message}")]
    Invalid {
        /// Dotted field path, e.g. `execution.call_timeout_ms`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A `KEEL_*` variable could not be applied.
    #[error("invalid environment variable {var}: {message}")]
    Env {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
