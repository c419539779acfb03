//! Sandbox error types.

use thiserror::Error;

/// Errors raised while creating or driving a sandbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// The sandbox worker could not be started.
    #[error("failed to spawn sandbox: {0}")]
    Spawn(String),

    /// The script engine failed outside of plugin code.
    #[error("script engine error: {0}")]
    Engine(String),

    /// The sandbox is gone and no longer accepts messages.
    #[error("sandbox channel closed")]
    ChannelClosed,

    /// Boundary parameters did not have the expected shape.
    #[error("invalid boundary params: {0}")]
    InvalidParams(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
