//! Bridge from `keel_config::Config` to domain types.
//!
//! The config crate depends on no other internal crate; conversions into
//! runtime, sandbox, event and logging types live here, in one place.

use keel_config::Config;
use keel_events::EventBus;
use keel_sandbox::SandboxLimits;
use keel_telemetry::{LogConfig, LogFormat};

use crate::options::ExecutionOptions;

/// Convert config to [`ExecutionOptions`].
#[must_use]
pub fn to_execution_options(cfg: &Config) -> ExecutionOptions {
    ExecutionOptions {
        call_timeout: cfg.execution.call_timeout(),
        init_timeout: cfg.execution.init_timeout(),
    }
}

/// Convert config to [`SandboxLimits`].
#[must_use]
pub fn to_sandbox_limits(cfg: &Config) -> SandboxLimits {
    SandboxLimits {
        memory_limit_bytes: cfg.sandbox.memory_limit_bytes,
        max_stack_size_bytes: cfg.sandbox.max_stack_size_bytes,
    }
}

/// Build the process-wide event bus sized from config.
#[must_use]
pub fn to_event_bus(cfg: &Config) -> EventBus {
    EventBus::with_capacity(cfg.events.channel_capacity)
}

/// Convert config to [`LogConfig`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = match cfg.logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        _ => LogFormat::Compact,
    };

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);
    if let Some(level) = &cfg.logging.console_level {
        log_config = log_config.with_console_level(level);
    }

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}
