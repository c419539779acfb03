//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted timeout (one hour).
const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Smallest accepted sandbox heap (1 MiB).
const MIN_MEMORY_LIMIT_BYTES: usize = 1_048_576;

/// Smallest accepted sandbox stack (64 KiB).
const MIN_STACK_SIZE_BYTES: usize = 65_536;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_execution(config)?;
    validate_sandbox(config)?;
    validate_events(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_owned(),
        message,
    }
}

fn validate_execution(config: &Config) -> ConfigResult<()> {
    let e = &config.execution;
    for (field, value) in [
        ("execution.call_timeout_ms", e.call_timeout_ms),
        ("execution.init_timeout_ms", e.init_timeout_ms),
    ] {
        if value == 0 || value > MAX_TIMEOUT_MS {
            return Err(invalid(
                field,
                format!("timeout must be between 1 and {MAX_TIMEOUT_MS} ms, got {value}"),
            ));
        }
    }
    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;
    if s.memory_limit_bytes < MIN_MEMORY_LIMIT_BYTES {
        return Err(invalid(
            "sandbox.memory_limit_bytes",
            format!("must be at least {MIN_MEMORY_LIMIT_BYTES} bytes"),
        ));
    }
    if s.max_stack_size_bytes < MIN_STACK_SIZE_BYTES {
        return Err(invalid(
            "sandbox.max_stack_size_bytes",
            format!("must be at least {MIN_STACK_SIZE_BYTES} bytes"),
        ));
    }
    Ok(())
}

fn validate_events(config: &Config) -> ConfigResult<()> {
    if config.events.channel_capacity == 0 {
        return Err(invalid(
            "events.channel_capacity",
            "must be greater than zero".to_owned(),
        ));
    }
    Ok(())
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

fn one_of(field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(invalid(
        field,
        format!("\"{value}\" is not one of {}", allowed.join(", ")),
    ))
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let logging = &config.logging;
    one_of("logging.level", &logging.level, &LOG_LEVELS)?;
    one_of("logging.format", &logging.format, &LOG_FORMATS)?;
    if let Some(level) = &logging.console_level {
        one_of("logging.console_level", level, &LOG_LEVELS)?;
    }
    Ok(())
}
