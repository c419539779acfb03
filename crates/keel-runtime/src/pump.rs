//! The per-context message pump.
//!
//! One task per context drains the sandbox's outbound channel. Responses are
//! routed to the correlation table; `endowment.request` calls are served on
//! their own tasks so a slow endowment never stalls response routing.

use std::sync::Arc;

use keel_capabilities::{InvocationOptions, PermissionPipeline};
use keel_core::{BoundaryMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PluginId, RequestId};
use keel_events::{EventBus, EventMetadata, KeelEvent};
use keel_sandbox::BoundaryReceiver;
use keel_sandbox::protocol::{EndowmentRequestParams, SNAP_ENDOWMENT, decode_params, methods};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::context::{ContextState, ExecutionContext};
use crate::endowment::EndowmentProvider;

/// Event source tag of everything the execution service publishes.
pub(crate) const EVENT_SOURCE: &str = "ExecutionService";

/// What the pump needs besides the context itself.
#[derive(Clone)]
pub(crate) struct PumpDeps {
    pub(crate) bus: Arc<EventBus>,
    pub(crate) provider: Arc<dyn EndowmentProvider>,
    pub(crate) pipeline: Option<Arc<PermissionPipeline>>,
}

/// Payload of `snap.request(...)`.
#[derive(Debug, Deserialize)]
struct RestrictedCall {
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Start the pump of `ctx`.
pub(crate) fn spawn(
    ctx: Arc<ExecutionContext>,
    receiver: BoundaryReceiver,
    deps: PumpDeps,
) -> JoinHandle<()> {
    tokio::spawn(run(ctx, receiver, deps))
}

async fn run(ctx: Arc<ExecutionContext>, mut receiver: BoundaryReceiver, deps: PumpDeps) {
    let cancel = ctx.cancellation_token();
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            message = receiver.recv() => message,
        };
        match message {
            Some(BoundaryMessage::Response(response)) => {
                ctx.pending().resolve(response);
            },
            Some(BoundaryMessage::Request(request)) => handle_request(&ctx, &deps, request),
            None => break,
        }
    }

    if cancel.is_cancelled() {
        return;
    }
    // The sandbox went away without being terminated.
    cancel.cancel();
    let cancelled = ctx.pending().cancel_all();
    ctx.set_state(ContextState::Crashed);
    error!(
        plugin_id = %ctx.plugin_id(),
        cancelled_calls = cancelled,
        "Sandbox exited unexpectedly"
    );
    deps.bus.publish(KeelEvent::UnhandledError {
        metadata: EventMetadata::new(EVENT_SOURCE),
        plugin_id: ctx.plugin_id().clone(),
        message: "Sandbox exited unexpectedly".to_string(),
    });
}

fn handle_request(ctx: &Arc<ExecutionContext>, deps: &PumpDeps, request: JsonRpcRequest) {
    let Some(id) = request.id.clone() else {
        warn!(
            plugin_id = %ctx.plugin_id(),
            method = %request.method,
            "Dropping notification from sandbox"
        );
        return;
    };

    if request.method != methods::ENDOWMENT_REQUEST {
        warn!(plugin_id = %ctx.plugin_id(), method = %request.method, "Unknown method from sandbox");
        reply(ctx, id, Err(JsonRpcError::method_not_found(&request.method)));
        return;
    }

    let params: EndowmentRequestParams = match decode_params(request.params.as_ref()) {
        Ok(params) => params,
        Err(e) => {
            reply(ctx, id, Err(JsonRpcError::invalid_params(e.to_string())));
            return;
        },
    };

    if params.endowment != SNAP_ENDOWMENT && !ctx.has_endowment(&params.endowment) {
        warn!(
            plugin_id = %ctx.plugin_id(),
            endowment = %params.endowment,
            "Request through an endowment that was not granted"
        );
        let message = format!(
            "Endowment \"{}\" was not granted to snap \"{}\".",
            params.endowment,
            ctx.plugin_id()
        );
        reply(ctx, id, Err(JsonRpcError::unauthorized(message)));
        return;
    }

    let ctx = Arc::clone(ctx);
    let deps = deps.clone();
    tokio::spawn(async move {
        let cancel = ctx.cancellation_token();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(plugin_id = %ctx.plugin_id(), request_id = %id, "Endowment request cancelled");
            },
            result = serve(&ctx, &deps, params) => reply(&ctx, id, result),
        }
    });
}

async fn serve(
    ctx: &ExecutionContext,
    deps: &PumpDeps,
    params: EndowmentRequestParams,
) -> Result<Value, JsonRpcError> {
    if params.endowment == SNAP_ENDOWMENT {
        return invoke_restricted(ctx.plugin_id(), deps.pipeline.as_deref(), params.request).await;
    }

    let _audit = OutboundAudit::start(&deps.bus, ctx.plugin_id());
    deps.provider
        .request(ctx.plugin_id(), &params.endowment, params.request)
        .await
}

async fn invoke_restricted(
    plugin_id: &PluginId,
    pipeline: Option<&PermissionPipeline>,
    request: Value,
) -> Result<Value, JsonRpcError> {
    let call: RestrictedCall = serde_json::from_value(request)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid snap request: {e}")))?;
    let Some(pipeline) = pipeline else {
        return Err(JsonRpcError::method_not_found(&call.method));
    };
    pipeline
        .invoke(
            plugin_id,
            &call.method,
            call.params.as_ref(),
            InvocationOptions::default(),
        )
        .await
        .map_err(|e| e.to_rpc_error())
}

fn reply(ctx: &ExecutionContext, id: RequestId, result: Result<Value, JsonRpcError>) {
    let response = JsonRpcResponse::from_result(id, result);
    if ctx.sender().send(response.into()).is_err() {
        debug!(plugin_id = %ctx.plugin_id(), "Sandbox gone before reply");
    }
}

/// Publishes `outboundRequest` on creation and `outboundResponse` on drop, so
/// every started outbound call is closed even when its future is dropped.
struct OutboundAudit<'a> {
    bus: &'a EventBus,
    plugin_id: &'a PluginId,
    correlation_id: Uuid,
}

impl<'a> OutboundAudit<'a> {
    fn start(bus: &'a EventBus, plugin_id: &'a PluginId) -> Self {
        let correlation_id = Uuid::new_v4();
        bus.publish(KeelEvent::OutboundRequest {
            metadata: EventMetadata::new(EVENT_SOURCE).with_correlation_id(correlation_id),
            plugin_id: plugin_id.clone(),
        });
        Self {
            bus,
            plugin_id,
            correlation_id,
        }
    }
}

impl Drop for OutboundAudit<'_> {
    fn drop(&mut self) {
        self.bus.publish(KeelEvent::OutboundResponse {
            metadata: EventMetadata::new(EVENT_SOURCE).with_correlation_id(self.correlation_id),
            plugin_id: self.plugin_id.clone(),
        });
    }
}
