//! `use keel_telemetry::prelude::*;` for logging setup.

pub use crate::{
    CONSOLE_TARGET, LogConfig, LogFormat, LogTarget, TelemetryError, TelemetryResult,
    setup_default_logging, setup_logging,
};
