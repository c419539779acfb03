//! Boundary methods and their parameter shapes.
//!
//! Host to sandbox: `executeSnap`, `snapRpc`, `ping` and the `terminate`
//! notification. Sandbox to host: `endowment.request`, issued whenever plugin
//! code calls `request` on an endowment global (including `snap`).

use keel_core::HandlerType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SandboxError, SandboxResult};

/// Boundary method names.
pub mod methods {
    /// Evaluate plugin source inside a fresh sandbox.
    pub const EXECUTE_SNAP: &str = "executeSnap";
    /// Invoke an exported handler.
    pub const SNAP_RPC: &str = "snapRpc";
    /// Liveness probe, answered with `"OK"`.
    pub const PING: &str = "ping";
    /// Stop the sandbox. Sent as a notification.
    pub const TERMINATE: &str = "terminate";
    /// Plugin-originated call through an endowment.
    pub const ENDOWMENT_REQUEST: &str = "endowment.request";
}

/// Name of the endowment that routes to restricted methods.
pub const SNAP_ENDOWMENT: &str = "snap";

/// Endowment served inside the sandbox and forwarded to host logging.
pub const CONSOLE_ENDOWMENT: &str = "console";

/// Params of `executeSnap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSnapParams {
    /// Plugin identity, for diagnostics inside the sandbox.
    pub snap_id: String,
    /// Plugin source text.
    pub source_code: String,
    /// Endowment names exposed as globals.
    #[serde(default)]
    pub endowments: Vec<String>,
}

/// Params of `snapRpc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapRpcParams {
    /// Plugin identity the call is addressed to.
    pub target: String,
    /// Exported handler to invoke.
    pub handler: HandlerType,
    /// Origin of the caller.
    pub origin: String,
    /// Request object handed to the handler.
    pub request: Value,
}

/// Params of `endowment.request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndowmentRequestParams {
    /// Endowment the plugin called through.
    pub endowment: String,
    /// Arguments the plugin passed to `request`.
    #[serde(default)]
    pub request: Value,
}

/// Decode request params into `T`. Missing params decode from `null`.
///
/// # Errors
///
/// Returns [`SandboxError::InvalidParams`] if the params do not match `T`.
pub fn decode_params<T: DeserializeOwned>(params: Option<&Value>) -> SandboxResult<T> {
    let value = params.cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| SandboxError::InvalidParams(e.to_string()))
}

/// Encode params for a request.
///
/// # Errors
///
/// Returns [`SandboxError::InvalidParams`] if `params` cannot be serialized.
pub fn encode_params<T: Serialize>(params: &T) -> SandboxResult<Value> {
    serde_json::to_value(params).map_err(|e| SandboxError::InvalidParams(e.to_string()))
}
