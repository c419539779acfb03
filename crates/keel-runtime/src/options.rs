//! Execution service options.

use std::time::Duration;

/// Default bound on a single handler call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on initial evaluation of plugin source.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts applied by the execution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Bound on each `handleRpcRequest` call.
    pub call_timeout: Duration,
    /// Bound on the `executeSnap` evaluation.
    pub init_timeout: Duration,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }
}

impl ExecutionOptions {
    /// Set the call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the init timeout.
    #[must_use]
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }
}
