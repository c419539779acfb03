//! Per-plugin execution contexts.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use keel_core::{JsonRpcError, JsonRpcRequest, PluginId};
use keel_sandbox::{BoundarySender, SandboxHandle};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlation::{CallOutcome, PendingCalls, PendingGuard, request_id};
use crate::error::{ExecutionError, ExecutionResult};

/// Lifecycle state of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Sandbox created, source not yet evaluated.
    Starting,
    /// Source evaluated; handlers can be called.
    Running,
    /// The sandbox stopped on its own.
    Crashed,
    /// Torn down by the host.
    Terminated,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Crashed => f.write_str("crashed"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

/// The host's view of one running sandbox.
///
/// Owns the sandbox handle and the correlation table of the calls made into
/// it. Host-side tasks serving the plugin run under [`Self::cancellation_token`].
pub struct ExecutionContext {
    plugin_id: PluginId,
    sender: BoundarySender,
    handle: Box<dyn SandboxHandle>,
    endowments: HashSet<String>,
    state: Mutex<ContextState>,
    cancel: CancellationToken,
    pending: Arc<PendingCalls>,
    pump: Mutex<Option<JoinHandle<()>>>,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("plugin_id", &self.plugin_id)
            .field("state", &self.state())
            .field("endowments", &self.endowments)
            .field("pending", &self.pending.len())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Wrap a freshly created sandbox.
    #[must_use]
    pub fn new(
        plugin_id: PluginId,
        sender: BoundarySender,
        handle: Box<dyn SandboxHandle>,
        endowments: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            plugin_id,
            sender,
            handle,
            endowments: endowments.into_iter().collect(),
            state: Mutex::new(ContextState::Starting),
            cancel: CancellationToken::new(),
            pending: Arc::new(PendingCalls::new()),
            pump: Mutex::new(None),
            created_at: Utc::now(),
        }
    }

    /// The plugin this context runs.
    #[must_use]
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ContextState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Whether `endowment` was granted at load time.
    #[must_use]
    pub fn has_endowment(&self, endowment: &str) -> bool {
        self.endowments.contains(endowment)
    }

    /// Granted endowment names.
    #[must_use]
    pub fn endowments(&self) -> &HashSet<String> {
        &self.endowments
    }

    /// The correlation table of calls into this context.
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingCalls> {
        &self.pending
    }

    /// Token cancelled when the context goes away.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// When the context was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the sandbox has fully stopped.
    #[must_use]
    pub fn is_sandbox_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn sender(&self) -> &BoundarySender {
        &self.sender
    }

    pub(crate) fn attach_pump(&self, pump: JoinHandle<()>) {
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
    }

    /// Send a correlated request into the sandbox and wait for its response.
    ///
    /// The outer result reports transport failures ([`ExecutionError::Timeout`],
    /// [`ExecutionError::Cancelled`]); the inner one is what the sandbox said.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Timeout`] if nothing arrives within
    /// `timeout`, and [`ExecutionError::Cancelled`] if the context is torn
    /// down first.
    pub async fn call(
        &self,
        origin: &str,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> ExecutionResult<Result<Value, JsonRpcError>> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        let (id, receiver) = self.pending.register(origin, method, params.clone());
        let _guard = PendingGuard::new(&self.pending, id);
        // Shutdown may have swept the table between the check and the insert.
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        debug!(plugin_id = %self.plugin_id, request_id = id, method, "Calling into sandbox");
        let request = JsonRpcRequest::new(request_id(id), method, params);
        if self.sender.send(request.into()).is_err() {
            return Err(self.cancelled());
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(CallOutcome::Response(response))) => Ok(response),
            Ok(Ok(CallOutcome::Cancelled) | Err(_)) => Err(self.cancelled()),
            Err(_) => {
                warn!(
                    plugin_id = %self.plugin_id,
                    request_id = id,
                    method,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Sandbox call timed out"
                );
                Err(ExecutionError::Timeout {
                    plugin_id: self.plugin_id.clone(),
                    method: method.to_string(),
                    timeout,
                })
            },
        }
    }

    /// Tear the context down. Never fails; later calls do nothing new.
    ///
    /// Returns how many pending calls were cancelled.
    pub fn shutdown(&self) -> usize {
        self.cancel.cancel();
        let cancelled = self.pending.cancel_all();
        self.handle.terminate();
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        self.set_state(ContextState::Terminated);
        cancelled
    }

    fn cancelled(&self) -> ExecutionError {
        ExecutionError::Cancelled {
            plugin_id: self.plugin_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{BoundaryMessage, JsonRpcResponse};
    use keel_sandbox::boundary_channel;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct FlagHandle(Arc<AtomicBool>);

    impl SandboxHandle for FlagHandle {
        fn terminate(&self) {
            self.0.store(true, Ordering::SeqCst);
        }

        fn is_finished(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn context() -> (ExecutionContext, keel_sandbox::BoundaryReceiver, Arc<AtomicBool>) {
        let (sender, receiver) = boundary_channel();
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = ExecutionContext::new(
            PluginId::new("npm:ctx").unwrap(),
            sender,
            Box::new(FlagHandle(Arc::clone(&flag))),
            ["fetch".to_string()],
        );
        (ctx, receiver, flag)
    }

    #[tokio::test]
    async fn test_call_resolves_through_pending_table() {
        let (ctx, mut inbound, _) = context();
        let ctx = Arc::new(ctx);

        let responder = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let Some(BoundaryMessage::Request(request)) = inbound.recv().await else {
                    panic!("expected a request");
                };
                assert_eq!(request.method, "ping");
                ctx.pending()
                    .resolve(JsonRpcResponse::success(request.id.unwrap(), json!("OK")));
            })
        };

        let result = ctx
            .call("host", "ping", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, Ok(json!("OK")));
        responder.await.unwrap();
        assert!(ctx.pending().is_empty());
    }

    #[tokio::test]
    async fn test_call_times_out_and_frees_slot() {
        let (ctx, _inbound, _) = context();
        let err = ctx
            .call("host", "snapRpc", None, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));
        assert!(ctx.pending().is_empty());
        assert_eq!(ctx.state(), ContextState::Starting);
    }

    #[tokio::test]
    async fn test_abandoned_call_frees_slot() {
        let (ctx, _inbound, _) = context();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            ctx.call("host", "snapRpc", None, Duration::from_secs(30)),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(ctx.pending().is_empty());

        let aborted = tokio::select! {
            result = ctx.call("host", "ping", None, Duration::from_secs(30)) => Some(result),
            () = tokio::time::sleep(Duration::from_millis(20)) => None,
        };
        assert!(aborted.is_none());
        assert!(ctx.pending().is_empty());
        assert_eq!(ctx.state(), ContextState::Starting);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_terminates() {
        let (ctx, _inbound, flag) = context();
        let ctx = Arc::new(ctx);

        let waiting = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.call("host", "snapRpc", None, Duration::from_secs(30))
                    .await
            })
        };
        while ctx.pending().is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(ctx.shutdown(), 1);
        assert!(matches!(
            waiting.await.unwrap(),
            Err(ExecutionError::Cancelled { .. })
        ));
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(ctx.state(), ContextState::Terminated);

        // Idempotent, and calls after shutdown fail fast.
        assert_eq!(ctx.shutdown(), 0);
        assert!(matches!(
            ctx.call("host", "ping", None, Duration::from_secs(1)).await,
            Err(ExecutionError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_endowments() {
        let (ctx, _inbound, _) = context();
        assert!(ctx.has_endowment("fetch"));
        assert!(!ctx.has_endowment("ethereum"));
    }
}
