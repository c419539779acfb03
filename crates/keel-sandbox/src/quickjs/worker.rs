//! The sandbox worker thread: one QuickJS runtime, one context, one plugin.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keel_core::{JsonRpcError, PluginId};
use rquickjs::{CatchResultExt, Context, Ctx, Function, Runtime};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::error::{SandboxError, SandboxResult};
use crate::factory::{BoundaryReceiver, BoundarySender};
use crate::limits::SandboxLimits;
use crate::protocol::{ExecuteSnapParams, SnapRpcParams, decode_params, methods};
use crate::quickjs::bridge::{HostBridge, parse_envelope};

const PRELUDE: &str = include_str!("prelude.js");

/// Entry point of the worker thread. Returns when the sandbox is terminated
/// or the host drops its end of the channel.
pub(crate) fn run(
    plugin_id: PluginId,
    limits: SandboxLimits,
    inbound: BoundaryReceiver,
    outbound: BoundarySender,
    interrupt: Arc<AtomicBool>,
) {
    let worker = match Worker::new(plugin_id.clone(), limits, inbound, outbound, interrupt) {
        Ok(worker) => worker,
        Err(e) => {
            error!(plugin_id = %plugin_id, error = %e, "Failed to start sandbox");
            return;
        },
    };
    worker.serve();
    debug!(plugin_id = %plugin_id, "Sandbox worker exited");
}

struct Worker {
    // Dropped before `runtime`.
    context: Context,
    runtime: Runtime,
    bridge: Rc<HostBridge>,
    loaded: Cell<bool>,
    next_task: Cell<u64>,
}

impl Worker {
    fn new(
        plugin_id: PluginId,
        limits: SandboxLimits,
        inbound: BoundaryReceiver,
        outbound: BoundarySender,
        interrupt: Arc<AtomicBool>,
    ) -> SandboxResult<Self> {
        let runtime = Runtime::new().map_err(|e| SandboxError::Engine(e.to_string()))?;
        runtime.set_memory_limit(limits.memory_limit_bytes);
        runtime.set_max_stack_size(limits.max_stack_size_bytes);
        let flag = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::Acquire))));

        let context = Context::full(&runtime).map_err(|e| SandboxError::Engine(e.to_string()))?;
        let bridge = Rc::new(HostBridge::new(plugin_id, inbound, outbound, interrupt));

        context.with(|ctx| {
            install_globals(&ctx, &bridge)
                .catch(&ctx)
                .map_err(|e| SandboxError::Engine(e.to_string()))
        })?;

        Ok(Self {
            context,
            runtime,
            bridge,
            loaded: Cell::new(false),
            next_task: Cell::new(1),
        })
    }

    fn serve(&self) {
        while let Some(request) = self.bridge.next_request() {
            let result = match request.method.as_str() {
                methods::TERMINATE => {
                    debug!(plugin_id = %self.bridge.plugin_id(), "Sandbox received terminate");
                    break;
                },
                methods::PING => Ok(json!("OK")),
                methods::EXECUTE_SNAP => self.execute_snap(request.params.as_ref()),
                methods::SNAP_RPC => self.snap_rpc(request.params.as_ref()),
                other => Err(JsonRpcError::method_not_found(other)),
            };
            match request.id {
                Some(id) => {
                    if !self.bridge.respond(id, result) {
                        break;
                    }
                },
                None => debug!(
                    plugin_id = %self.bridge.plugin_id(),
                    method = %request.method,
                    "Ignoring notification"
                ),
            }
            if self.bridge.interrupted() {
                break;
            }
        }
    }

    fn execute_snap(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let params: ExecuteSnapParams =
            decode_params(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        if self.loaded.get() {
            return Err(JsonRpcError::internal("Plugin source was already evaluated"));
        }
        info!(
            plugin_id = %self.bridge.plugin_id(),
            snap_id = %params.snap_id,
            endowments = ?params.endowments,
            "Evaluating plugin source"
        );

        let endowments = serde_json::to_string(&params.endowments)
            .map_err(|e| JsonRpcError::internal(e.to_string()))?;
        let source = params.source_code;
        let envelope =
            self.call_global::<String>("__keel_load", |load| load.call((source, endowments)))?;
        self.drain_jobs();

        let result = parse_envelope(&envelope)?;
        self.loaded.set(true);
        Ok(result)
    }

    fn snap_rpc(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let params: SnapRpcParams =
            decode_params(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
        let handler = params.handler.export_name().to_string();
        let args = json!({ "origin": params.origin, "request": params.request }).to_string();

        let task = self.next_task.get();
        self.next_task.set(task.wrapping_add(1));
        let key = task.to_string();

        debug!(plugin_id = %self.bridge.plugin_id(), handler = %handler, task, "Dispatching handler");
        let dispatch_key = key.clone();
        let dispatch_handler = handler.clone();
        self.call_global::<()>("__keel_dispatch", move |dispatch| {
            dispatch.call((dispatch_key, dispatch_handler, args))
        })?;
        self.drain_jobs();

        let envelope =
            self.call_global::<Option<String>>("__keel_take", move |take| take.call((key,)))?;
        match envelope {
            Some(envelope) => parse_envelope(&envelope),
            None if self.bridge.interrupted() => {
                Err(JsonRpcError::internal("Sandbox was terminated"))
            },
            None => Err(JsonRpcError::internal(format!(
                "Handler \"{handler}\" never settled"
            ))),
        }
    }

    /// Look up a prelude function and call it, turning script exceptions into
    /// internal errors.
    fn call_global<R>(
        &self,
        name: &str,
        invoke: impl for<'js> FnOnce(&Function<'js>) -> rquickjs::Result<R>,
    ) -> Result<R, JsonRpcError> {
        self.context.with(|ctx| {
            ctx.globals()
                .get::<_, Function>(name)
                .and_then(|function| invoke(&function))
                .catch(&ctx)
                .map_err(|e| JsonRpcError::internal(e.to_string()))
        })
    }

    /// Run queued promise jobs until none are left or the sandbox is
    /// interrupted.
    fn drain_jobs(&self) {
        while !self.bridge.interrupted() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {},
                Ok(false) => break,
                Err(exception) => {
                    warn!(
                        plugin_id = %self.bridge.plugin_id(),
                        "Pending job raised an uncaught exception"
                    );
                    // The exception holds a context it does not own; dropping
                    // it releases the runtime's context twice.
                    std::mem::forget(exception);
                },
            }
        }
    }
}

/// Install the host functions, then the prelude that hides them.
fn install_globals<'js>(ctx: &Ctx<'js>, bridge: &Rc<HostBridge>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let host = Rc::clone(bridge);
    let request = Function::new(ctx.clone(), move |endowment: String, payload: String| {
        host.request_endowment(&endowment, &payload)
    })?;
    globals.set("__keel_host_request", request)?;

    let plugin_id = bridge.plugin_id().clone();
    let console = Function::new(ctx.clone(), move |level: String, line: String| {
        match level.as_str() {
            "error" => error!(target: "keel_sandbox::console", plugin_id = %plugin_id, "{line}"),
            "warn" => warn!(target: "keel_sandbox::console", plugin_id = %plugin_id, "{line}"),
            "debug" => debug!(target: "keel_sandbox::console", plugin_id = %plugin_id, "{line}"),
            _ => info!(target: "keel_sandbox::console", plugin_id = %plugin_id, "{line}"),
        }
    })?;
    globals.set("__keel_console", console)?;

    ctx.eval::<(), _>(PRELUDE)
}
