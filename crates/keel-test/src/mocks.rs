//! Mock implementations for testing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use keel_capabilities::{HookError, MethodHooks};
use keel_core::{BoundaryMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PluginId};
use keel_crypto::{CryptographicFunctions, DefaultCryptography};
use keel_sandbox::protocol::methods;
use keel_sandbox::{
    BoundaryReceiver, BoundarySender, ExecutionContextFactory, SandboxError, SandboxHandle,
    SandboxInstance, SandboxResult, boundary_channel,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::WeakUnboundedSender;
use zeroize::Zeroizing;

use crate::fixtures::TEST_MNEMONIC;

/// A hook invocation recorded by [`MockHooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    /// `get_mnemonic(source)`.
    Mnemonic(Option<String>),
    /// `get_mnemonic_seed(source)`.
    Seed(Option<String>),
    /// `get_unlock_promise(should_prompt)`.
    Unlock(bool),
}

/// What `get_unlock_promise` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnlockBehavior {
    /// Resolve immediately.
    #[default]
    Unlocked,
    /// Never resolve, as if the user never answers the prompt.
    Never,
    /// Fail with [`HookError::Rejected`].
    Reject,
}

/// Mock implementation of [`MethodHooks`] backed by [`TEST_MNEMONIC`].
///
/// Every call is recorded. Only the primary source (`None`) and the source
/// ids added with [`MockHooks::with_source`] exist.
pub struct MockHooks {
    calls: Mutex<Vec<HookCall>>,
    sources: Vec<String>,
    unlock: UnlockBehavior,
    unlock_waits: Arc<AtomicUsize>,
    backend: Option<Arc<dyn CryptographicFunctions>>,
}

impl fmt::Debug for MockHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHooks")
            .field("calls", &self.calls())
            .field("sources", &self.sources)
            .field("unlock", &self.unlock)
            .finish_non_exhaustive()
    }
}

impl Default for MockHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHooks {
    /// Unlocked hooks with only the primary entropy source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            sources: Vec::new(),
            unlock: UnlockBehavior::Unlocked,
            unlock_waits: Arc::new(AtomicUsize::new(0)),
            backend: None,
        }
    }

    /// Add a named entropy source (same phrase as the primary one).
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Change what `get_unlock_promise` does.
    #[must_use]
    pub fn with_unlock(mut self, unlock: UnlockBehavior) -> Self {
        self.unlock = unlock;
        self
    }

    /// Hand out `backend` from `get_cryptographic_backend`.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn CryptographicFunctions>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Recorded calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `get_mnemonic` was ever called.
    #[must_use]
    pub fn mnemonic_requested(&self) -> bool {
        self.calls()
            .iter()
            .any(|call| matches!(call, HookCall::Mnemonic(_)))
    }

    /// Number of `get_unlock_promise` futures currently suspended.
    #[must_use]
    pub fn unlock_waits_in_flight(&self) -> usize {
        self.unlock_waits.load(Ordering::SeqCst)
    }

    fn record(&self, call: HookCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn check_source(&self, source: Option<&str>) -> Result<(), HookError> {
        match source {
            None => Ok(()),
            Some(id) if self.sources.iter().any(|s| s == id) => Ok(()),
            Some(id) => Err(HookError::UnknownSource(id.to_string())),
        }
    }
}

/// Decrements the in-flight unlock counter when the wait is dropped.
struct UnlockWait(Arc<AtomicUsize>);

impl UnlockWait {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for UnlockWait {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MethodHooks for MockHooks {
    async fn get_mnemonic(&self, source: Option<&str>) -> Result<Zeroizing<Vec<u8>>, HookError> {
        self.record(HookCall::Mnemonic(source.map(str::to_string)));
        self.check_source(source)?;
        Ok(Zeroizing::new(TEST_MNEMONIC.as_bytes().to_vec()))
    }

    async fn get_mnemonic_seed(
        &self,
        source: Option<&str>,
    ) -> Result<Zeroizing<Vec<u8>>, HookError> {
        self.record(HookCall::Seed(source.map(str::to_string)));
        self.check_source(source)?;
        keel_crypto::mnemonic_to_seed(TEST_MNEMONIC.as_bytes(), "", &DefaultCryptography)
            .map_err(|e| HookError::Other(e.to_string()))
    }

    async fn get_unlock_promise(&self, should_prompt: bool) -> Result<(), HookError> {
        self.record(HookCall::Unlock(should_prompt));
        match self.unlock {
            UnlockBehavior::Unlocked => Ok(()),
            UnlockBehavior::Reject => Err(HookError::Rejected("the wallet is locked".into())),
            UnlockBehavior::Never => {
                let _wait = UnlockWait::enter(&self.unlock_waits);
                std::future::pending::<()>().await;
                Ok(())
            },
        }
    }

    fn get_cryptographic_backend(&self) -> Option<Arc<dyn CryptographicFunctions>> {
        self.backend.clone()
    }
}

/// How a scripted sandbox answers one host request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Answer right away.
    Respond(Result<Value, JsonRpcError>),
    /// Answer after a delay, letting later requests overtake this one.
    Delayed(Duration, Result<Value, JsonRpcError>),
    /// Never answer.
    Silent,
    /// Exit without being terminated, closing the boundary channel.
    Crash,
}

/// Decides the [`Reply`] to each host request.
pub type Responder = Arc<dyn Fn(&PluginId, &JsonRpcRequest) -> Reply + Send + Sync>;

/// The default behavior: `executeSnap` and `ping` answer `"OK"`, `snapRpc`
/// echoes `params.request`, anything else is method-not-found.
#[must_use]
pub fn default_reply(_plugin_id: &PluginId, request: &JsonRpcRequest) -> Reply {
    match request.method.as_str() {
        methods::EXECUTE_SNAP | methods::PING => Reply::Respond(Ok(json!("OK"))),
        methods::SNAP_RPC => Reply::Respond(Ok(request
            .params
            .as_ref()
            .and_then(|params| params.get("request"))
            .cloned()
            .unwrap_or(Value::Null))),
        other => Reply::Respond(Err(JsonRpcError::method_not_found(other))),
    }
}

/// Test-side view of one scripted sandbox.
#[derive(Debug, Clone)]
pub struct SandboxProbe {
    outbound: WeakUnboundedSender<BoundaryMessage>,
    requests: Arc<Mutex<Vec<JsonRpcRequest>>>,
    host_responses: Arc<Mutex<Vec<JsonRpcResponse>>>,
    terminated: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl SandboxProbe {
    /// Send `message` to the host as if the sandbox had sent it. Returns
    /// `false` once the sandbox has exited.
    pub fn inject(&self, message: impl Into<BoundaryMessage>) -> bool {
        self.outbound
            .upgrade()
            .is_some_and(|sender| sender.send(message.into()).is_ok())
    }

    /// Host requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Responses the host sent to injected requests.
    #[must_use]
    pub fn host_responses(&self) -> Vec<JsonRpcResponse> {
        self.host_responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the host terminated the sandbox.
    #[must_use]
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Whether the sandbox task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Handle of a scripted sandbox.
#[derive(Debug)]
pub struct ScriptedHandle {
    inbound: BoundarySender,
    terminated: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl SandboxHandle for ScriptedHandle {
    fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            let _ = self
                .inbound
                .send(JsonRpcRequest::notification(methods::TERMINATE, None).into());
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// [`ExecutionContextFactory`] whose sandboxes are tokio tasks answering
/// from a [`Responder`].
///
/// Must be used from inside a tokio runtime.
pub struct ScriptedFactory {
    responder: Responder,
    probes: Mutex<HashMap<PluginId, SandboxProbe>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
}

impl fmt::Debug for ScriptedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedFactory")
            .field("created", &self.created_count())
            .finish_non_exhaustive()
    }
}

impl Default for ScriptedFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFactory {
    /// Factory using [`default_reply`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_responder(default_reply)
    }

    /// Factory answering through `responder`.
    #[must_use]
    pub fn with_responder(
        responder: impl Fn(&PluginId, &JsonRpcRequest) -> Reply + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            probes: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    /// Make every later `create` fail.
    pub fn fail_next_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// The most recent sandbox created for `plugin_id`.
    #[must_use]
    pub fn probe(&self, plugin_id: &PluginId) -> Option<SandboxProbe> {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin_id)
            .cloned()
    }

    /// Number of sandboxes created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ExecutionContextFactory for ScriptedFactory {
    fn create(&self, plugin_id: &PluginId) -> SandboxResult<SandboxInstance> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SandboxError::Spawn("scripted failure".into()));
        }

        let (inbound_tx, inbound_rx) = boundary_channel();
        let (outbound_tx, outbound_rx) = boundary_channel();
        let probe = SandboxProbe {
            outbound: outbound_tx.downgrade(),
            requests: Arc::new(Mutex::new(Vec::new())),
            host_responses: Arc::new(Mutex::new(Vec::new())),
            terminated: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        };
        let handle = ScriptedHandle {
            inbound: inbound_tx.clone(),
            terminated: Arc::clone(&probe.terminated),
            finished: Arc::clone(&probe.finished),
        };

        tokio::spawn(run_scripted(
            plugin_id.clone(),
            Arc::clone(&self.responder),
            inbound_rx,
            outbound_tx,
            probe.clone(),
        ));

        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plugin_id.clone(), probe);
        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(SandboxInstance {
            sender: inbound_tx,
            receiver: outbound_rx,
            handle: Box::new(handle),
        })
    }
}

async fn run_scripted(
    plugin_id: PluginId,
    responder: Responder,
    mut inbound: BoundaryReceiver,
    outbound: BoundarySender,
    probe: SandboxProbe,
) {
    while let Some(message) = inbound.recv().await {
        let request = match message {
            BoundaryMessage::Response(response) => {
                probe
                    .host_responses
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(response);
                continue;
            },
            BoundaryMessage::Request(request) => request,
        };
        if request.method == methods::TERMINATE {
            break;
        }
        probe
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let Some(id) = request.id.clone() else {
            continue;
        };

        match responder(&plugin_id, &request) {
            Reply::Respond(result) => {
                let _ = outbound.send(JsonRpcResponse::from_result(id, result).into());
            },
            Reply::Delayed(delay, result) => {
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = outbound.send(JsonRpcResponse::from_result(id, result).into());
                });
            },
            Reply::Silent => {},
            Reply::Crash => break,
        }
    }
    probe.finished.store(true, Ordering::SeqCst);
}
