//! Host side of granted endowments.
//!
//! When plugin code calls `request(args)` on an endowment global, the sandbox
//! sends an `endowment.request` to the host. The execution service checks the
//! endowment was granted and hands the payload to an [`EndowmentProvider`]
//! supplied by the surrounding application (a network client, a storage
//! backend, ...).

use async_trait::async_trait;
use keel_core::{JsonRpcError, PluginId};
use serde_json::Value;

/// Serves outbound requests made through granted endowments.
#[async_trait]
pub trait EndowmentProvider: Send + Sync {
    /// Handle one request `plugin_id` made through `endowment`.
    ///
    /// # Errors
    ///
    /// The returned error is thrown inside the plugin as-is.
    async fn request(
        &self,
        plugin_id: &PluginId,
        endowment: &str,
        request: Value,
    ) -> Result<Value, JsonRpcError>;
}

/// Provider that serves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEndowments;

#[async_trait]
impl EndowmentProvider for NoEndowments {
    async fn request(
        &self,
        _plugin_id: &PluginId,
        endowment: &str,
        _request: Value,
    ) -> Result<Value, JsonRpcError> {
        Err(JsonRpcError::method_not_found(endowment))
    }
}
