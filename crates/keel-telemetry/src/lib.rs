//! Keel Telemetry - Logging for the Keel plugin execution engine.
//!
//! This crate provides configurable `tracing` setup with pretty, compact and
//! JSON output. Console output of sandboxed plugins arrives under the
//! `keel_sandbox::console` target, so it can be filtered separately.
//!
//! # Example
//!
//! ```rust,no_run
//! use keel_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), keel_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("keel_sandbox::console=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("engine starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    CONSOLE_TARGET, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};
