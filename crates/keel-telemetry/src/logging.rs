//! `tracing` subscriber setup.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

/// Target under which sandboxed `console.*` output is logged.
pub const CONSOLE_TARGET: &str = "keel_sandbox::console";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::InvalidSetting(format!(
                "unknown log format \"{other}\""
            ))),
        }
    }
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter, e.g. `info` or `keel_runtime=debug,warn`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Output stream.
    pub target: LogTarget,
    /// Level for plugin console output. `None` leaves it to `level`.
    pub console_level: Option<String>,
    /// Extra filter directives, applied after `level`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            console_level: None,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Settings with base filter `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Use `format`.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Write to `target`.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log plugin console output at `level` regardless of the base filter.
    #[must_use]
    pub fn with_console_level(mut self, level: impl Into<String>) -> Self {
        self.console_level = Some(level.into());
        self
    }

    /// Append a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::InvalidSetting(format!("{}: {e}", self.level)))?;
        let console = self
            .console_level
            .as_ref()
            .map(|level| format!("{CONSOLE_TARGET}={level}"));
        for directive in self.directives.iter().chain(console.as_ref()) {
            let parsed = directive
                .parse()
                .map_err(|e| TelemetryError::InvalidSetting(format!("{directive}: {e}")))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn layer<W>(&self, writer: W) -> TelemetryResult<Box<dyn Layer<Registry> + Send + Sync>>
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let filter = self.filter()?;
        // Sandbox threads are named after their plugin.
        let base = fmt::layer().with_writer(writer).with_thread_names(true);
        Ok(match self.format {
            LogFormat::Json => base.json().with_ansi(false).with_filter(filter).boxed(),
            LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => base.compact().with_filter(filter).boxed(),
        })
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// [`TelemetryError::InvalidSetting`] for an unparsable filter, and
/// [`TelemetryError::AlreadyInitialized`] if a global subscriber exists.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let layer = match config.target {
        LogTarget::Stdout => config.layer(std::io::stdout)?,
        LogTarget::Stderr => config.layer(std::io::stderr)?,
    };
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

/// [`setup_logging`] with [`LogConfig::default`].
///
/// # Errors
///
/// See [`setup_logging`].
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}
