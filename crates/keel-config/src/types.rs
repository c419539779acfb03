//! Configuration types for the Keel engine.
//!
//! These types have no dependencies on other internal keel crates. Domain
//! types (execution options, sandbox limits, log config) are built from them
//! at the integration boundary. Every struct implements [`Default`] matching
//! the embedded `defaults.toml`, so a bare `[section]` header in TOML yields
//! a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution service timeouts.
    pub execution: ExecutionSection,
    /// Per-sandbox resource limits.
    pub sandbox: SandboxSection,
    /// Event bus sizing.
    pub events: EventsSection,
    /// Logging setup.
    pub logging: LoggingSection,
}

/// `[execution]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Maximum time for a single handler call, in milliseconds.
    pub call_timeout_ms: u64,
    /// Maximum time for initial evaluation of plugin source, in milliseconds.
    pub init_timeout_ms: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            call_timeout_ms: 60_000,
            init_timeout_ms: 60_000,
        }
    }
}

impl ExecutionSection {
    /// Call timeout as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Init timeout as a [`Duration`].
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

/// `[sandbox]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Script engine heap ceiling, in bytes.
    pub memory_limit_bytes: usize,
    /// Script engine stack ceiling, in bytes.
    pub max_stack_size_bytes: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 67_108_864,
            max_stack_size_bytes: 1_048_576,
        }
    }
}

/// `[events]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    /// Broadcast buffer size. Slow receivers lag beyond it.
    pub channel_capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"` or `"json"`.
    pub format: String,
    /// Level for plugin `console.*` output. Unset follows `level`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_level: Option<String>,
    /// Per-crate tracing directives (e.g. `["keel_sandbox=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            console_level: None,
            directives: Vec::new(),
        }
    }
}
