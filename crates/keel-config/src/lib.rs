#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration of the Keel engine.
//!
//! [`Config`] has four sections: `[execution]` timeouts, `[sandbox]` limits,
//! `[events]` bus sizing and `[logging]`. Values are layered, later layers
//! winning:
//!
//! 1. `defaults.toml`, embedded at compile time
//! 2. an optional TOML file
//! 3. `KEEL_*` environment variables
//!
//! The merged result is validated before it is returned.
//!
//! ```rust,no_run
//! use keel_config::Config;
//!
//! let config = Config::load(Some(std::path::Path::new("keel.toml"))).unwrap();
//! println!("call timeout: {:?}", config.execution.call_timeout());
//! ```
//!
//! Nothing here depends on the other keel crates; `keel_runtime::config_bridge`
//! turns sections into runtime types.

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration from defaults, an optional file and `KEEL_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed or the final
    /// configuration fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// Load configuration from a single file over the defaults, ignoring the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
