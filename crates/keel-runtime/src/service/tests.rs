use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use keel_capabilities::{GrantStore, PermissionPipeline, RestrictedTarget};
use keel_core::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PluginId, RequestId, error_codes};
use keel_events::{EventBus, EventKind, EventReceiver};
use keel_sandbox::protocol::methods;
use keel_sandbox::{SandboxHandle, SandboxInstance, SandboxResult};
use keel_test::{
    MOCK_ORIGIN, MockHooks, Reply, ScriptedFactory, UnlockBehavior, default_reply,
    grant_derivation, mock_plugin_id, setup_test_logging_default, test_plugin_id,
};
use serde_json::{Value, json};

use super::*;

struct EchoProvider;

#[async_trait]
impl EndowmentProvider for EchoProvider {
    async fn request(
        &self,
        _plugin_id: &PluginId,
        endowment: &str,
        request: Value,
    ) -> Result<Value, JsonRpcError> {
        Ok(json!({ "endowment": endowment, "echo": request }))
    }
}

fn service_with(factory: Arc<ScriptedFactory>, options: ExecutionOptions) -> ExecutionService {
    setup_test_logging_default();
    ExecutionService::new(factory, Arc::new(EventBus::new()), options)
}

fn service(factory: Arc<ScriptedFactory>) -> ExecutionService {
    service_with(factory, ExecutionOptions::default())
}

/// `snapRpc` waits `params.request.delay` ms, then echoes; a `"silent"`
/// request never answers and `"crash"` kills the sandbox.
fn scripted(plugin_id: &PluginId, request: &JsonRpcRequest) -> Reply {
    if request.method != methods::SNAP_RPC {
        return default_reply(plugin_id, request);
    }
    let inner = request
        .params
        .as_ref()
        .and_then(|p| p.get("request"))
        .cloned()
        .unwrap_or(Value::Null);
    match inner.get("method").and_then(Value::as_str) {
        Some("silent") => Reply::Silent,
        Some("crash") => Reply::Crash,
        Some("throw") => Reply::Respond(Err(JsonRpcError::unauthorized("Not allowed."))),
        _ => {
            let delay = inner.get("delay").and_then(Value::as_u64).unwrap_or(0);
            Reply::Delayed(Duration::from_millis(delay), Ok(inner))
        },
    }
}

/// Counts how many of its sandboxes were terminated.
#[derive(Debug)]
struct CountingHandle {
    inner: Box<dyn SandboxHandle>,
    terminated: Arc<AtomicUsize>,
}

impl SandboxHandle for CountingHandle {
    fn terminate(&self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        self.inner.terminate();
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Wraps a [`ScriptedFactory`]. `create` first waits on `gate` when one is
/// set, then looks the plugin up in `service` when one is set.
struct RacingFactory {
    inner: ScriptedFactory,
    gate: Option<Barrier>,
    service: OnceLock<Weak<ExecutionService>>,
    seen_running: AtomicUsize,
    terminated: Arc<AtomicUsize>,
}

impl RacingFactory {
    fn new(gate: Option<Barrier>) -> Self {
        Self {
            inner: ScriptedFactory::new(),
            gate,
            service: OnceLock::new(),
            seen_running: AtomicUsize::new(0),
            terminated: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ExecutionContextFactory for RacingFactory {
    fn create(&self, plugin_id: &PluginId) -> SandboxResult<SandboxInstance> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if let Some(service) = self.service.get().and_then(Weak::upgrade)
            && service.is_running(plugin_id)
        {
            self.seen_running.fetch_add(1, Ordering::SeqCst);
        }
        let SandboxInstance {
            sender,
            receiver,
            handle,
        } = self.inner.create(plugin_id)?;
        Ok(SandboxInstance {
            sender,
            receiver,
            handle: Box::new(CountingHandle {
                inner: handle,
                terminated: Arc::clone(&self.terminated),
            }),
        })
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_event(events: &mut EventReceiver) -> Arc<keel_events::KeelEvent> {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

fn endowment_request(id: u64, endowment: &str, request: Value) -> JsonRpcRequest {
    JsonRpcRequest::new(
        RequestId::Number(id),
        methods::ENDOWMENT_REQUEST,
        Some(json!({ "endowment": endowment, "request": request })),
    )
}

#[tokio::test]
async fn test_execute_snap_starts_context() {
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory));
    let mut events = service.bus().subscribe_kinds([EventKind::PluginStarted]);
    let id = mock_plugin_id();

    let result = service.execute_snap(&id, "code", &[]).await.unwrap();
    assert_eq!(result, json!("OK"));
    assert!(service.is_running(&id));
    assert_eq!(service.context_state(&id), Some(ContextState::Running));
    assert_eq!(next_event(&mut events).await.plugin_id(), &id);

    let load = &factory.probe(&id).unwrap().requests()[0];
    assert_eq!(load.method, methods::EXECUTE_SNAP);
    assert_eq!(load.params.as_ref().unwrap()["sourceCode"], "code");
}

#[tokio::test]
async fn test_duplicate_context_rejected() {
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory));
    let id = mock_plugin_id();

    service.execute_snap(&id, "code", &[]).await.unwrap();
    let err = service.execute_snap(&id, "code", &[]).await.unwrap_err();
    assert_eq!(err, ExecutionError::DuplicateContext { plugin_id: id });
    assert_eq!(factory.created_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_factory_runs_without_map_lock() {
    setup_test_logging_default();
    let factory = Arc::new(RacingFactory::new(None));
    let service = Arc::new(ExecutionService::new(
        Arc::clone(&factory) as Arc<dyn ExecutionContextFactory>,
        Arc::new(EventBus::new()),
        ExecutionOptions::default(),
    ));
    factory.service.set(Arc::downgrade(&service)).unwrap();
    let id = mock_plugin_id();

    let started = tokio::spawn({
        let service = Arc::clone(&service);
        let id = id.clone();
        async move { service.execute_snap(&id, "code", &[]).await }
    });
    let result = tokio::time::timeout(Duration::from_secs(5), started)
        .await
        .expect("execute_snap blocked inside the factory")
        .unwrap();

    assert_eq!(result.unwrap(), json!("OK"));
    assert_eq!(factory.seen_running.load(Ordering::SeqCst), 0);
    assert!(service.is_running(&id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_execute_snap_keeps_one_context() {
    setup_test_logging_default();
    let factory = Arc::new(RacingFactory::new(Some(Barrier::new(2))));
    let service = Arc::new(ExecutionService::new(
        Arc::clone(&factory) as Arc<dyn ExecutionContextFactory>,
        Arc::new(EventBus::new()),
        ExecutionOptions::default(),
    ));
    let id = mock_plugin_id();

    let start = || {
        let service = Arc::clone(&service);
        let id = id.clone();
        tokio::spawn(async move { service.execute_snap(&id, "code", &[]).await })
    };
    let (first, second) = tokio::join!(start(), start());
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| {
        matches!(r, Err(ExecutionError::DuplicateContext { plugin_id }) if *plugin_id == id)
    }));
    assert_eq!(factory.inner.created_count(), 2);
    // The losing sandbox is stopped; the winner keeps running.
    assert_eq!(factory.terminated.load(Ordering::SeqCst), 1);
    assert_eq!(service.context_count(), 1);
    assert_eq!(service.ping(&id).await.unwrap(), json!("OK"));
}

#[tokio::test]
async fn test_evaluation_error_discards_context() {
    let factory = Arc::new(ScriptedFactory::with_responder(|id, request| {
        if request.method == methods::EXECUTE_SNAP {
            Reply::Respond(Err(JsonRpcError::internal("Crashed.")))
        } else {
            default_reply(id, request)
        }
    }));
    let service = service(Arc::clone(&factory));
    let id = mock_plugin_id();

    let err = service.execute_snap(&id, "throw", &[]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Error while running snap '{id}': Crashed.")
    );
    assert!(!service.is_running(&id));
    assert!(factory.probe(&id).unwrap().was_terminated());

    // The identity is free again.
    assert!(matches!(
        service.execute_snap(&id, "throw", &[]).await,
        Err(ExecutionError::Evaluation { .. })
    ));
}

#[tokio::test]
async fn test_factory_failure() {
    let factory = Arc::new(ScriptedFactory::new());
    factory.fail_next_creates(true);
    let service = service(factory);
    let id = mock_plugin_id();

    assert!(matches!(
        service.execute_snap(&id, "code", &[]).await,
        Err(ExecutionError::Sandbox(_))
    ));
    assert_eq!(service.context_count(), 0);
}

#[tokio::test]
async fn test_unknown_plugin() {
    let service = service(Arc::new(ScriptedFactory::new()));
    let err = service
        .handle_rpc_request(&mock_plugin_id(), HandlerCall::rpc(MOCK_ORIGIN, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::UnknownPlugin { .. }));
    assert_eq!(err.to_rpc_error().code, error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_rpc_request_carries_handler_and_origin() {
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory));
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let result = service
        .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, json!({"method": "foo"})))
        .await
        .unwrap();
    assert_eq!(result, json!({"method": "foo"}));

    let call = factory.probe(&id).unwrap().requests().pop().unwrap();
    assert_eq!(call.method, methods::SNAP_RPC);
    let params = call.params.unwrap();
    assert_eq!(params["handler"], "onRpcRequest");
    assert_eq!(params["origin"], MOCK_ORIGIN);
    assert_eq!(params["target"], id.as_str());
}

#[tokio::test]
async fn test_handler_error_is_surfaced() {
    let factory = Arc::new(ScriptedFactory::with_responder(scripted));
    let service = service(factory);
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let err = service
        .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, json!({"method": "throw"})))
        .await
        .unwrap_err();
    let ExecutionError::Handler { plugin_id, error } = err else {
        panic!("expected a handler error");
    };
    assert_eq!(plugin_id, id);
    assert_eq!(error.code, error_codes::UNAUTHORIZED);
    assert_eq!(error.message, "Not allowed.");

    // The context survives a failing handler.
    assert_eq!(service.ping(&id).await.unwrap(), json!("OK"));
}

#[tokio::test]
async fn test_out_of_order_responses_match_their_requests() {
    let factory = Arc::new(ScriptedFactory::with_responder(scripted));
    let service = Arc::new(service(factory));
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let mut calls = Vec::new();
    for (n, delay) in [(0_u64, 60_u64), (1, 5), (2, 30), (3, 0)] {
        let service = Arc::clone(&service);
        let id = id.clone();
        calls.push(tokio::spawn(async move {
            let request = json!({"method": "echo", "n": n, "delay": delay});
            let result = service
                .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, request.clone()))
                .await
                .unwrap();
            (request, result)
        }));
    }
    for call in calls {
        let (request, result) = call.await.unwrap();
        assert_eq!(request, result);
    }
    assert_eq!(service.pending_calls(&id), 0);
}

#[tokio::test]
async fn test_timeout_frees_slot_and_keeps_context() {
    let factory = Arc::new(ScriptedFactory::with_responder(scripted));
    let service = service_with(
        factory,
        ExecutionOptions::default().with_call_timeout(Duration::from_millis(50)),
    );
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let err = service
        .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, json!({"method": "silent"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Timeout { ref method, .. } if method == methods::SNAP_RPC));
    assert_eq!(service.pending_calls(&id), 0);
    assert_eq!(service.ping(&id).await.unwrap(), json!("OK"));
}

#[tokio::test]
async fn test_terminate_cancels_pending_calls() {
    let factory = Arc::new(ScriptedFactory::with_responder(scripted));
    let service = Arc::new(service(Arc::clone(&factory)));
    let mut events = service.bus().subscribe_kinds([EventKind::PluginTerminated]);
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let waiting = {
        let service = Arc::clone(&service);
        let id = id.clone();
        tokio::spawn(async move {
            service
                .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, json!({"method": "silent"})))
                .await
        })
    };
    eventually(|| service.pending_calls(&id) == 1).await;

    assert!(service.terminate_snap(&id));
    assert!(matches!(
        waiting.await.unwrap(),
        Err(ExecutionError::Cancelled { .. })
    ));
    assert!(!service.is_running(&id));
    assert_eq!(service.pending_calls(&id), 0);
    assert_eq!(next_event(&mut events).await.plugin_id(), &id);

    let probe = factory.probe(&id).unwrap();
    assert!(probe.was_terminated());
    eventually(|| probe.is_finished()).await;

    // Idempotent.
    assert!(!service.terminate_snap(&id));
    assert!(!service.terminate_snap(&test_plugin_id("npm:never-started")));
}

#[tokio::test]
async fn test_terminate_all_snaps() {
    let factory = Arc::new(ScriptedFactory::with_responder(scripted));
    let service = Arc::new(service(factory));
    let ids = [test_plugin_id("npm:a"), test_plugin_id("npm:b")];

    let mut waiting = Vec::new();
    for id in &ids {
        service.execute_snap(id, "code", &[]).await.unwrap();
        let service = Arc::clone(&service);
        let id = id.clone();
        waiting.push(tokio::spawn(async move {
            service
                .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, json!({"method": "silent"})))
                .await
        }));
    }
    for id in &ids {
        eventually(|| service.pending_calls(id) == 1).await;
    }

    assert_eq!(service.terminate_all_snaps(), 2);
    for call in waiting {
        assert!(matches!(
            call.await.unwrap(),
            Err(ExecutionError::Cancelled { .. })
        ));
    }
    assert_eq!(service.context_count(), 0);
    assert_eq!(service.terminate_all_snaps(), 0);
}

#[tokio::test]
async fn test_sandbox_crash_rejects_calls_and_reports() {
    let factory = Arc::new(ScriptedFactory::with_responder(scripted));
    let service = service(factory);
    let mut events = service.bus().subscribe_kinds([EventKind::UnhandledError]);
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let err = service
        .handle_rpc_request(&id, HandlerCall::rpc(MOCK_ORIGIN, json!({"method": "crash"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Cancelled { .. }));
    assert_eq!(next_event(&mut events).await.plugin_id(), &id);
    assert_eq!(service.context_state(&id), Some(ContextState::Crashed));

    // Crashed contexts stay registered until terminated.
    assert!(matches!(
        service.ping(&id).await,
        Err(ExecutionError::Cancelled { .. })
    ));
    assert!(service.terminate_snap(&id));
}

#[tokio::test]
async fn test_stray_responses_are_dropped() {
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory));
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let probe = factory.probe(&id).unwrap();
    assert!(probe.inject(JsonRpcResponse::success(RequestId::Number(999), json!("late"))));
    assert!(probe.inject(JsonRpcResponse::success(
        RequestId::String("bogus".into()),
        json!("late")
    )));
    assert_eq!(service.ping(&id).await.unwrap(), json!("OK"));
}

#[tokio::test]
async fn test_granted_endowment_is_audited() {
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory)).with_endowment_provider(Arc::new(EchoProvider));
    let mut events = service
        .bus()
        .subscribe_kinds([EventKind::OutboundRequest, EventKind::OutboundResponse]);
    let id = mock_plugin_id();
    service
        .execute_snap(&id, "code", &["fetch".to_string()])
        .await
        .unwrap();

    let probe = factory.probe(&id).unwrap();
    probe.inject(endowment_request(1, "fetch", json!({"url": "https://example.com"})));
    eventually(|| !probe.host_responses().is_empty()).await;

    let response = probe.host_responses().remove(0);
    assert_eq!(response.id, RequestId::Number(1));
    assert_eq!(
        response.into_result().unwrap(),
        json!({"endowment": "fetch", "echo": {"url": "https://example.com"}})
    );

    let request = next_event(&mut events).await;
    let response = next_event(&mut events).await;
    assert_eq!(request.kind(), EventKind::OutboundRequest);
    assert_eq!(response.kind(), EventKind::OutboundResponse);
    assert_eq!(request.plugin_id(), &id);
    assert_eq!(response.plugin_id(), &id);
    assert_eq!(
        request.metadata().correlation_id,
        response.metadata().correlation_id
    );
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_ungranted_endowment_is_refused() {
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory)).with_endowment_provider(Arc::new(EchoProvider));
    let mut events = service
        .bus()
        .subscribe_kinds([EventKind::OutboundRequest, EventKind::OutboundResponse]);
    let id = mock_plugin_id();
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let probe = factory.probe(&id).unwrap();
    probe.inject(endowment_request(7, "fetch", json!({})));
    probe.inject(JsonRpcRequest::new(RequestId::Number(8), "eth_call", None));
    eventually(|| probe.host_responses().len() == 2).await;

    let responses = probe.host_responses();
    let refused = responses[0].clone().into_result().unwrap_err();
    assert_eq!(refused.code, error_codes::UNAUTHORIZED);
    let unknown = responses[1].clone().into_result().unwrap_err();
    assert_eq!(unknown.code, error_codes::METHOD_NOT_FOUND);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_snap_request_goes_through_pipeline() {
    let id = mock_plugin_id();
    let grants = Arc::new(GrantStore::in_memory());
    grant_derivation(
        &grants,
        &id,
        RestrictedTarget::GetBip32Entropy,
        &["m", "44'", "1'"],
        "secp256k1",
    );
    let pipeline = Arc::new(PermissionPipeline::new(grants, Arc::new(MockHooks::new())));
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory)).with_permission_pipeline(pipeline);
    service.execute_snap(&id, "code", &[]).await.unwrap();

    let probe = factory.probe(&id).unwrap();
    probe.inject(endowment_request(
        1,
        "snap",
        json!({
            "method": "snap_getBip32Entropy",
            "params": {"path": ["m", "44'", "1'"], "curve": "secp256k1"},
        }),
    ));
    probe.inject(endowment_request(
        2,
        "snap",
        json!({
            "method": "snap_getBip32Entropy",
            "params": {"path": ["m", "44'", "2'"], "curve": "secp256k1"},
        }),
    ));
    eventually(|| probe.host_responses().len() == 2).await;

    for response in probe.host_responses() {
        match response.id {
            RequestId::Number(1) => {
                let node = response.into_result().unwrap();
                assert_eq!(node["curve"], "secp256k1");
                assert_eq!(node["depth"], 2);
            },
            RequestId::Number(2) => {
                let err = response.into_result().unwrap_err();
                assert_eq!(err.code, error_codes::UNAUTHORIZED);
            },
            other => panic!("unexpected response id {other}"),
        }
    }
}

#[tokio::test]
async fn test_terminate_drops_pending_unlock_wait() {
    let id = mock_plugin_id();
    let grants = Arc::new(GrantStore::in_memory());
    grant_derivation(
        &grants,
        &id,
        RestrictedTarget::GetBip32Entropy,
        &["m", "44'", "1'"],
        "secp256k1",
    );
    let hooks = Arc::new(MockHooks::new().with_unlock(UnlockBehavior::Never));
    let dyn_hooks: Arc<dyn keel_capabilities::MethodHooks> = Arc::<MockHooks>::clone(&hooks);
    let pipeline = Arc::new(PermissionPipeline::new(grants, dyn_hooks));
    let factory = Arc::new(ScriptedFactory::new());
    let service = service(Arc::clone(&factory)).with_permission_pipeline(pipeline);
    service.execute_snap(&id, "code", &[]).await.unwrap();

    factory.probe(&id).unwrap().inject(endowment_request(
        1,
        "snap",
        json!({
            "method": "snap_getBip32Entropy",
            "params": {"path": ["m", "44'", "1'"], "curve": "secp256k1"},
        }),
    ));
    eventually(|| hooks.unlock_waits_in_flight() == 1).await;

    assert!(service.terminate_snap(&id));
    eventually(|| hooks.unlock_waits_in_flight() == 0).await;
    assert!(factory.probe(&id).unwrap().host_responses().is_empty());
}
