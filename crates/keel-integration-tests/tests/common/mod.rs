//! Shared test harness for integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel_capabilities::{GrantStore, MethodHooks, PermissionPipeline};
use keel_config::Config;
use keel_core::{JsonRpcError, PluginId};
use keel_events::{EventBus, EventReceiver, KeelEvent};
use keel_runtime::config_bridge::{to_event_bus, to_execution_options, to_sandbox_limits};
use keel_runtime::{EndowmentProvider, ExecutionOptions, ExecutionService};
use keel_sandbox::QuickJsFactory;
use keel_test::{MockHooks, setup_test_logging_default};
use serde_json::{Value, json};

/// Network-like endowment that answers every request with `200` and echoes
/// the request back.
#[allow(dead_code)]
pub struct EchoNetwork;

#[async_trait]
impl EndowmentProvider for EchoNetwork {
    async fn request(
        &self,
        _plugin_id: &PluginId,
        _endowment: &str,
        request: Value,
    ) -> Result<Value, JsonRpcError> {
        Ok(json!({ "status": 200, "body": request }))
    }
}

/// Endowment that never answers.
#[allow(dead_code)]
pub struct StalledNetwork;

#[async_trait]
impl EndowmentProvider for StalledNetwork {
    async fn request(
        &self,
        _plugin_id: &PluginId,
        _endowment: &str,
        _request: Value,
    ) -> Result<Value, JsonRpcError> {
        std::future::pending().await
    }
}

/// A QuickJS-backed execution service with a permission pipeline over
/// [`MockHooks`].
#[allow(dead_code)]
pub struct Harness {
    /// The service under test.
    pub service: Arc<ExecutionService>,
    /// The bus the service publishes on.
    pub bus: Arc<EventBus>,
    /// Grants consulted by the pipeline.
    pub grants: Arc<GrantStore>,
    /// Hooks handed to the pipeline.
    pub hooks: Arc<MockHooks>,
}

#[allow(dead_code)]
impl Harness {
    /// Harness built from default configuration, serving endowments with
    /// [`EchoNetwork`].
    pub fn new() -> Self {
        Self::build(&Config::default(), MockHooks::new(), Arc::new(EchoNetwork))
    }

    /// Harness with custom timeouts.
    pub fn with_options(options: ExecutionOptions) -> Self {
        let mut cfg = Config::default();
        cfg.execution.call_timeout_ms = u64::try_from(options.call_timeout.as_millis()).unwrap();
        cfg.execution.init_timeout_ms = u64::try_from(options.init_timeout.as_millis()).unwrap();
        Self::build(&cfg, MockHooks::new(), Arc::new(EchoNetwork))
    }

    /// Harness with custom hooks and endowment provider.
    pub fn with_parts(hooks: MockHooks, provider: Arc<dyn EndowmentProvider>) -> Self {
        Self::build(&Config::default(), hooks, provider)
    }

    fn build(cfg: &Config, hooks: MockHooks, provider: Arc<dyn EndowmentProvider>) -> Self {
        setup_test_logging_default();
        let bus = Arc::new(to_event_bus(cfg));
        let grants = Arc::new(GrantStore::in_memory());
        let hooks = Arc::new(hooks);
        let pipeline_hooks: Arc<dyn MethodHooks> = Arc::clone(&hooks) as Arc<dyn MethodHooks>;
        let pipeline = Arc::new(PermissionPipeline::new(Arc::clone(&grants), pipeline_hooks));
        let factory = Arc::new(QuickJsFactory::new(to_sandbox_limits(cfg)));
        let service = ExecutionService::new(factory, Arc::clone(&bus), to_execution_options(cfg))
            .with_endowment_provider(provider)
            .with_permission_pipeline(pipeline);
        Self {
            service: Arc::new(service),
            bus,
            grants,
            hooks,
        }
    }
}

/// Next event, failing the test after five seconds.
#[allow(dead_code)]
pub async fn next_event(events: &mut EventReceiver) -> Arc<KeelEvent> {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed")
}

/// Poll `condition` until it holds, failing the test after five seconds.
#[allow(dead_code)]
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}
