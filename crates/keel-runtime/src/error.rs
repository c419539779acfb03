//! Execution service error types.

use std::time::Duration;

use keel_core::{JsonRpcError, PluginId, error_codes};
use keel_sandbox::SandboxError;
use thiserror::Error;

/// Errors surfaced by the execution service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The plugin already has an active execution context.
    #[error("Snap \"{plugin_id}\" is already being executed.")]
    DuplicateContext {
        /// The plugin.
        plugin_id: PluginId,
    },

    /// The plugin has no active execution context.
    #[error("Snap \"{plugin_id}\" is not currently running.")]
    UnknownPlugin {
        /// The plugin.
        plugin_id: PluginId,
    },

    /// Plugin code threw during initial evaluation.
    #[error("Error while running snap '{plugin_id}': {message}")]
    Evaluation {
        /// The plugin.
        plugin_id: PluginId,
        /// Message of the thrown error.
        message: String,
    },

    /// A handler threw, or reported an error.
    #[error("{}", .error.message)]
    Handler {
        /// The plugin.
        plugin_id: PluginId,
        /// The error as reported by the sandbox.
        error: JsonRpcError,
    },

    /// No response arrived within the call timeout.
    #[error("Call \"{method}\" to snap \"{plugin_id}\" timed out after {timeout:?}")]
    Timeout {
        /// The plugin.
        plugin_id: PluginId,
        /// Boundary method of the call.
        method: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The call was cancelled because its context was terminated or crashed.
    #[error("Call to snap \"{plugin_id}\" was cancelled")]
    Cancelled {
        /// The plugin.
        plugin_id: PluginId,
    },

    /// The sandbox could not be created or driven.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl ExecutionError {
    /// JSON-RPC representation, for callers that relay failures over the wire.
    #[must_use]
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::Handler { error, .. } => error.clone(),
            Self::UnknownPlugin { .. } => {
                JsonRpcError::new(error_codes::METHOD_NOT_FOUND, self.to_string())
            },
            _ => JsonRpcError::internal(self.to_string()),
        }
    }
}

/// Result type for execution service operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;
