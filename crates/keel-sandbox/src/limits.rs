//! Per-sandbox resource limits.

use serde::{Deserialize, Serialize};

/// Default heap ceiling of one sandbox (64 MiB).
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 67_108_864;

/// Default script stack ceiling of one sandbox (1 MiB).
pub const DEFAULT_MAX_STACK_SIZE_BYTES: usize = 1_048_576;

const WORKER_STACK_HEADROOM_BYTES: usize = 4_194_304;

/// Resource limits applied to each script engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Heap ceiling in bytes. Allocation beyond it fails inside the sandbox.
    pub memory_limit_bytes: usize,
    /// Script stack ceiling in bytes.
    pub max_stack_size_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            max_stack_size_bytes: DEFAULT_MAX_STACK_SIZE_BYTES,
        }
    }
}

impl SandboxLimits {
    /// Stack size of the native worker thread: the script stack plus
    /// headroom for the engine and host calls.
    #[must_use]
    pub fn worker_stack_size(&self) -> usize {
        self.max_stack_size_bytes.saturating_add(WORKER_STACK_HEADROOM_BYTES)
    }
}
