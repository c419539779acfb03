//! The execution service.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keel_capabilities::PermissionPipeline;
use keel_core::{HandlerType, PluginId};
use keel_events::{EventBus, EventMetadata, KeelEvent};
use keel_sandbox::ExecutionContextFactory;
use keel_sandbox::protocol::{ExecuteSnapParams, SnapRpcParams, encode_params, methods};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{ContextState, ExecutionContext};
use crate::endowment::{EndowmentProvider, NoEndowments};
use crate::error::{ExecutionError, ExecutionResult};
use crate::options::ExecutionOptions;
use crate::pump::{self, EVENT_SOURCE, PumpDeps};

/// Origin recorded on calls the host makes on its own behalf.
pub const HOST_ORIGIN: &str = "host";

/// A handler invocation, as passed to [`ExecutionService::handle_rpc_request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerCall {
    /// Who is calling (a dapp origin or another plugin id).
    pub origin: String,
    /// Exported handler to invoke.
    pub handler: HandlerType,
    /// Request object handed to the handler.
    pub request: Value,
}

impl HandlerCall {
    /// An `onRpcRequest` call.
    #[must_use]
    pub fn rpc(origin: impl Into<String>, request: Value) -> Self {
        Self {
            origin: origin.into(),
            handler: HandlerType::OnRpcRequest,
            request,
        }
    }
}

/// Creates, drives and tears down one execution context per plugin.
///
/// All state is per plugin; operations on different plugins never wait on
/// each other.
pub struct ExecutionService {
    factory: Arc<dyn ExecutionContextFactory>,
    contexts: DashMap<PluginId, Arc<ExecutionContext>>,
    deps: PumpDeps,
    options: ExecutionOptions,
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("contexts", &self.contexts.len())
            .field("options", &self.options)
            .field("has_pipeline", &self.deps.pipeline.is_some())
            .finish_non_exhaustive()
    }
}

impl ExecutionService {
    /// Create a service over `factory`, publishing on `bus`.
    ///
    /// Without further configuration, endowment requests are refused and
    /// restricted methods are unavailable.
    #[must_use]
    pub fn new(
        factory: Arc<dyn ExecutionContextFactory>,
        bus: Arc<EventBus>,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            factory,
            contexts: DashMap::new(),
            deps: PumpDeps {
                bus,
                provider: Arc::new(NoEndowments),
                pipeline: None,
            },
            options,
        }
    }

    /// Serve granted endowments through `provider`.
    #[must_use]
    pub fn with_endowment_provider(mut self, provider: Arc<dyn EndowmentProvider>) -> Self {
        self.deps.provider = provider;
        self
    }

    /// Route `snap.request` calls through `pipeline`.
    #[must_use]
    pub fn with_permission_pipeline(mut self, pipeline: Arc<PermissionPipeline>) -> Self {
        self.deps.pipeline = Some(pipeline);
        self
    }

    /// The configured timeouts.
    #[must_use]
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// The bus lifecycle and audit events are published on.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.deps.bus
    }

    /// Create a context for `plugin_id`, expose `endowments` in it and
    /// evaluate `source_code`. Returns `"OK"`.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::DuplicateContext`] if the plugin is already active
    /// - [`ExecutionError::Evaluation`] if the source throws while loading
    /// - [`ExecutionError::Timeout`] / [`ExecutionError::Cancelled`] if
    ///   evaluation does not finish
    /// - [`ExecutionError::Sandbox`] if no sandbox could be created
    ///
    /// On any failure the context is discarded again.
    pub async fn execute_snap(
        &self,
        plugin_id: &PluginId,
        source_code: &str,
        endowments: &[String],
    ) -> ExecutionResult<Value> {
        let params = encode_params(&ExecuteSnapParams {
            snap_id: plugin_id.to_string(),
            source_code: source_code.to_string(),
            endowments: endowments.to_vec(),
        })?;

        if self.contexts.contains_key(plugin_id) {
            return Err(ExecutionError::DuplicateContext {
                plugin_id: plugin_id.clone(),
            });
        }

        // No map lock may be held across `create`.
        let instance = self.factory.create(plugin_id)?;
        let ctx = match self.contexts.entry(plugin_id.clone()) {
            Entry::Occupied(_) => {
                instance.handle.terminate();
                return Err(ExecutionError::DuplicateContext {
                    plugin_id: plugin_id.clone(),
                });
            },
            Entry::Vacant(slot) => {
                let ctx = Arc::new(ExecutionContext::new(
                    plugin_id.clone(),
                    instance.sender,
                    instance.handle,
                    endowments.iter().cloned(),
                ));
                let pump = pump::spawn(Arc::clone(&ctx), instance.receiver, self.deps.clone());
                ctx.attach_pump(pump);
                slot.insert(Arc::clone(&ctx));
                ctx
            },
        };
        debug!(plugin_id = %plugin_id, endowments = ?endowments, "Execution context created");

        let outcome = ctx
            .call(
                HOST_ORIGIN,
                methods::EXECUTE_SNAP,
                Some(params),
                self.options.init_timeout,
            )
            .await;

        match outcome {
            Ok(Ok(value)) => {
                ctx.set_state(ContextState::Running);
                info!(plugin_id = %plugin_id, "Snap started");
                self.deps.bus.publish(KeelEvent::PluginStarted {
                    metadata: EventMetadata::new(EVENT_SOURCE),
                    plugin_id: plugin_id.clone(),
                });
                Ok(value)
            },
            Ok(Err(error)) => {
                self.discard(&ctx);
                warn!(plugin_id = %plugin_id, error = %error.message, "Snap failed to evaluate");
                Err(ExecutionError::Evaluation {
                    plugin_id: plugin_id.clone(),
                    message: error.message,
                })
            },
            Err(err) => {
                self.discard(&ctx);
                warn!(plugin_id = %plugin_id, error = %err, "Snap failed to start");
                Err(err)
            },
        }
    }

    /// Invoke `call.handler` in the plugin's context and wait for its result.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::UnknownPlugin`] if the plugin has no context
    /// - [`ExecutionError::Handler`] if the handler throws or is not exported
    /// - [`ExecutionError::Timeout`] / [`ExecutionError::Cancelled`]
    pub async fn handle_rpc_request(
        &self,
        plugin_id: &PluginId,
        call: HandlerCall,
    ) -> ExecutionResult<Value> {
        let ctx = self.context(plugin_id)?;
        let HandlerCall {
            origin,
            handler,
            request,
        } = call;

        debug!(plugin_id = %plugin_id, origin = %origin, handler = %handler, "Handling RPC request");
        let params = encode_params(&SnapRpcParams {
            target: plugin_id.to_string(),
            handler,
            origin: origin.clone(),
            request,
        })?;

        ctx.call(&origin, methods::SNAP_RPC, Some(params), self.options.call_timeout)
            .await?
            .map_err(|error| ExecutionError::Handler {
                plugin_id: plugin_id.clone(),
                error,
            })
    }

    /// Liveness probe of the plugin's sandbox.
    ///
    /// # Errors
    ///
    /// Same as [`Self::handle_rpc_request`].
    pub async fn ping(&self, plugin_id: &PluginId) -> ExecutionResult<Value> {
        let ctx = self.context(plugin_id)?;
        ctx.call(HOST_ORIGIN, methods::PING, None, self.options.call_timeout)
            .await?
            .map_err(|error| ExecutionError::Handler {
                plugin_id: plugin_id.clone(),
                error,
            })
    }

    /// Tear down the plugin's context. Pending calls fail with
    /// [`ExecutionError::Cancelled`]. Unknown plugins are ignored.
    ///
    /// Returns whether a context was torn down.
    pub fn terminate_snap(&self, plugin_id: &PluginId) -> bool {
        let Some((_, ctx)) = self.contexts.remove(plugin_id) else {
            debug!(plugin_id = %plugin_id, "Terminate requested for inactive snap");
            return false;
        };
        let cancelled = ctx.shutdown();
        info!(plugin_id = %plugin_id, cancelled_calls = cancelled, "Snap terminated");
        self.deps.bus.publish(KeelEvent::PluginTerminated {
            metadata: EventMetadata::new(EVENT_SOURCE),
            plugin_id: plugin_id.clone(),
        });
        true
    }

    /// Tear down every context. Returns how many were torn down.
    pub fn terminate_all_snaps(&self) -> usize {
        let ids: Vec<PluginId> = self
            .contexts
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let terminated = ids.iter().filter(|id| self.terminate_snap(id)).count();
        if terminated > 0 {
            info!(count = terminated, "Terminated all snaps");
        }
        terminated
    }

    /// Whether the plugin has a context.
    #[must_use]
    pub fn is_running(&self, plugin_id: &PluginId) -> bool {
        self.contexts.contains_key(plugin_id)
    }

    /// Ids of every plugin with a context.
    #[must_use]
    pub fn running_snaps(&self) -> Vec<PluginId> {
        self.contexts
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Lifecycle state of the plugin's context.
    #[must_use]
    pub fn context_state(&self, plugin_id: &PluginId) -> Option<ContextState> {
        self.contexts.get(plugin_id).map(|ctx| ctx.state())
    }

    /// The plugin's context, if it has one.
    #[must_use]
    pub fn get_context(&self, plugin_id: &PluginId) -> Option<Arc<ExecutionContext>> {
        self.context(plugin_id).ok()
    }

    /// Number of calls into the plugin still waiting for a response. Zero for
    /// unknown plugins.
    #[must_use]
    pub fn pending_calls(&self, plugin_id: &PluginId) -> usize {
        self.contexts
            .get(plugin_id)
            .map_or(0, |ctx| ctx.pending().len())
    }

    fn context(&self, plugin_id: &PluginId) -> ExecutionResult<Arc<ExecutionContext>> {
        self.contexts
            .get(plugin_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ExecutionError::UnknownPlugin {
                plugin_id: plugin_id.clone(),
            })
    }

    /// Drop a context that never started. Only removes the map entry if it
    /// still points at `ctx`.
    fn discard(&self, ctx: &Arc<ExecutionContext>) {
        self.contexts
            .remove_if(ctx.plugin_id(), |_, existing| Arc::ptr_eq(existing, ctx));
        ctx.shutdown();
    }
}

impl Drop for ExecutionService {
    fn drop(&mut self) {
        for entry in &self.contexts {
            entry.value().shutdown();
        }
    }
}

#[cfg(test)]
mod tests;
