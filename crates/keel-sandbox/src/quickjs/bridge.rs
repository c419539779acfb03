//! Host side of the sandbox's boundary channels, as seen from the worker
//! thread.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keel_core::{BoundaryMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PluginId, RequestId};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::factory::{BoundaryReceiver, BoundarySender};
use crate::protocol::methods;

/// Channel endpoints plus the bookkeeping needed to make a blocking
/// sandbox-to-host call while other host requests keep arriving.
pub(crate) struct HostBridge {
    plugin_id: PluginId,
    inbound: RefCell<BoundaryReceiver>,
    outbound: BoundarySender,
    /// Host requests that arrived while a plugin call was waiting.
    deferred: RefCell<VecDeque<JsonRpcRequest>>,
    next_id: Cell<u64>,
    interrupt: Arc<AtomicBool>,
}

impl HostBridge {
    pub(crate) fn new(
        plugin_id: PluginId,
        inbound: BoundaryReceiver,
        outbound: BoundarySender,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            plugin_id,
            inbound: RefCell::new(inbound),
            outbound,
            deferred: RefCell::new(VecDeque::new()),
            next_id: Cell::new(1),
            interrupt,
        }
    }

    pub(crate) fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    fn mark_interrupted(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Next host request, deferred ones first. `None` once the host hung up.
    pub(crate) fn next_request(&self) -> Option<JsonRpcRequest> {
        if let Some(request) = self.deferred.borrow_mut().pop_front() {
            return Some(request);
        }
        loop {
            match self.inbound.borrow_mut().blocking_recv()? {
                BoundaryMessage::Request(request) => return Some(request),
                BoundaryMessage::Response(response) => {
                    warn!(
                        plugin_id = %self.plugin_id,
                        id = %response.id,
                        "Dropping response with no waiting plugin call"
                    );
                },
            }
        }
    }

    /// Send a response to the host. Returns `false` if the host is gone.
    pub(crate) fn respond(&self, id: RequestId, result: Result<Value, JsonRpcError>) -> bool {
        let response = JsonRpcResponse::from_result(id, result);
        self.outbound.send(response.into()).is_ok()
    }

    /// Serve a plugin's `request` call on `endowment`.
    ///
    /// Blocks the worker until the host answers. `payload` is the JSON the
    /// plugin passed; the return value is a `{result}` or `{error}` envelope.
    pub(crate) fn request_endowment(&self, endowment: &str, payload: &str) -> String {
        envelope(self.call_host(endowment, payload))
    }

    fn call_host(&self, endowment: &str, payload: &str) -> Result<Value, JsonRpcError> {
        if self.interrupted() {
            return Err(JsonRpcError::internal("Sandbox is terminating"));
        }
        let request: Value = serde_json::from_str(payload)
            .map_err(|e| JsonRpcError::invalid_params(format!("unserializable request: {e}")))?;

        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let message = JsonRpcRequest::new(
            RequestId::Number(id),
            methods::ENDOWMENT_REQUEST,
            Some(json!({ "endowment": endowment, "request": request })),
        );
        debug!(plugin_id = %self.plugin_id, request_id = id, endowment, "Plugin called endowment");
        if self.outbound.send(message.into()).is_err() {
            self.mark_interrupted();
            return Err(JsonRpcError::internal("Sandbox is terminating"));
        }

        let expected = RequestId::Number(id);
        loop {
            let Some(message) = self.inbound.borrow_mut().blocking_recv() else {
                self.mark_interrupted();
                return Err(JsonRpcError::internal("Sandbox is terminating"));
            };
            match message {
                BoundaryMessage::Response(response) if response.id == expected => {
                    return response.into_result();
                },
                BoundaryMessage::Response(response) => {
                    warn!(
                        plugin_id = %self.plugin_id,
                        id = %response.id,
                        "Dropping response with unknown correlation id"
                    );
                },
                BoundaryMessage::Request(request) if request.method == methods::TERMINATE => {
                    self.mark_interrupted();
                    self.deferred.borrow_mut().push_back(request);
                    return Err(JsonRpcError::internal("Sandbox is terminating"));
                },
                BoundaryMessage::Request(request) => {
                    self.deferred.borrow_mut().push_back(request);
                },
            }
        }
    }
}

/// Encode a call outcome the way the prelude's `callHost` expects it.
fn envelope(result: Result<Value, JsonRpcError>) -> String {
    match result {
        Ok(value) => json!({ "result": value }).to_string(),
        Err(error) => json!({ "error": error }).to_string(),
    }
}

/// Decode a `{result}` / `{error}` envelope produced by the prelude.
pub(crate) fn parse_envelope(raw: &str) -> Result<Value, JsonRpcError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| JsonRpcError::internal(format!("malformed sandbox envelope: {e}")))?;
    if let Some(error) = value.get("error") {
        let error = serde_json::from_value::<JsonRpcError>(error.clone())
            .unwrap_or_else(|e| JsonRpcError::internal(format!("malformed sandbox error: {e}")));
        return Err(error);
    }
    Ok(value.get("result").cloned().unwrap_or(Value::Null))
}
