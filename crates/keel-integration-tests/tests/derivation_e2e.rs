//! Key derivation through the permission pipeline, from plugin code and from
//! the host side.

mod common;

use std::sync::Arc;

use keel_capabilities::{
    CapabilityError, InvocationOptions, PermissionPipeline, RestrictedTarget,
};
use keel_core::error_codes;
use keel_runtime::{ExecutionError, HandlerCall};
use keel_test::{
    HookCall, MOCK_ORIGIN, MockHooks, derivation_params, grant_derivation, mock_plugin_id,
};
use serde_json::{Value, json};

use common::{EchoNetwork, Harness};

const DERIVING_PLUGIN: &str = r#"
    module.exports.onRpcRequest = async ({ request }) =>
        snap.request({ method: request.method, params: request.params });
"#;

// Derivation paths must start at the master node "m".
const PERMITTED_PATH: [&str; 3] = ["m", "44'", "1'"];

fn grant_all(harness: &Harness) {
    for target in RestrictedTarget::ALL {
        grant_derivation(
            &harness.grants,
            &mock_plugin_id(),
            target,
            &PERMITTED_PATH,
            "secp256k1",
        );
    }
}

async fn derive(harness: &Harness, method: &str, params: Value) -> Result<Value, ExecutionError> {
    harness
        .service
        .handle_rpc_request(
            &mock_plugin_id(),
            HandlerCall::rpc(MOCK_ORIGIN, json!({ "method": method, "params": params })),
        )
        .await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_permitted_path_returns_node() {
    let harness = Harness::new();
    grant_all(&harness);
    harness
        .service
        .execute_snap(&mock_plugin_id(), DERIVING_PLUGIN, &[])
        .await
        .unwrap();

    let node = derive(
        &harness,
        "snap_getBip32Entropy",
        derivation_params(&PERMITTED_PATH, "secp256k1"),
    )
    .await
    .unwrap();

    assert_eq!(node["curve"], "secp256k1");
    assert_eq!(node["depth"], 2);
    assert!(node["publicKey"].as_str().unwrap().starts_with("0x04"));
    assert!(node["chainCode"].as_str().unwrap().starts_with("0x"));
    assert!(node.get("privateKey").is_none());
    assert!(!harness.hooks.mnemonic_requested());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_path_outside_caveat_is_denied() {
    let harness = Harness::new();
    grant_all(&harness);
    harness
        .service
        .execute_snap(&mock_plugin_id(), DERIVING_PLUGIN, &[])
        .await
        .unwrap();

    let err = derive(
        &harness,
        "snap_getBip32Entropy",
        derivation_params(&["m", "44'", "2'"], "secp256k1"),
    )
    .await
    .unwrap_err();
    let ExecutionError::Handler { error, .. } = err else {
        panic!("expected a handler error");
    };
    assert_eq!(error.code, error_codes::UNAUTHORIZED);

    // Same path, other curve: still outside the grant.
    let err = derive(
        &harness,
        "snap_getBip32Entropy",
        derivation_params(&PERMITTED_PATH, "ed25519"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_rpc_error().code, error_codes::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_public_key_target() {
    let harness = Harness::new();
    grant_all(&harness);
    harness
        .service
        .execute_snap(&mock_plugin_id(), DERIVING_PLUGIN, &[])
        .await
        .unwrap();

    let mut params = derivation_params(&PERMITTED_PATH, "secp256k1");
    params["compressed"] = json!(true);
    let key = derive(&harness, "snap_getBip32PublicKey", params)
        .await
        .unwrap();
    let key = key.as_str().unwrap();
    assert_eq!(key.len(), 68);
    assert!(key.starts_with("0x02") || key.starts_with("0x03"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ungranted_plugin_is_refused() {
    let harness = Harness::new();
    harness
        .service
        .execute_snap(&mock_plugin_id(), DERIVING_PLUGIN, &[])
        .await
        .unwrap();

    let err = derive(
        &harness,
        "snap_getBip32Entropy",
        derivation_params(&PERMITTED_PATH, "secp256k1"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_rpc_error().code, error_codes::UNAUTHORIZED);
    assert!(harness.hooks.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_entropy_source_propagates() {
    let harness = Harness::with_parts(MockHooks::new(), Arc::new(EchoNetwork));
    grant_all(&harness);
    harness
        .service
        .execute_snap(&mock_plugin_id(), DERIVING_PLUGIN, &[])
        .await
        .unwrap();

    let mut params = derivation_params(&PERMITTED_PATH, "secp256k1");
    params["source"] = json!("hardware-1");
    let err = derive(&harness, "snap_getBip32Entropy", params)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("hardware-1"));
}

fn direct_pipeline(hooks: Arc<MockHooks>) -> PermissionPipeline {
    let grants = Arc::new(keel_capabilities::GrantStore::in_memory());
    let entries = json!([
        {"path": ["m", "44'", "1'"], "curve": "secp256k1"},
        {"path": ["m", "44'", "501'"], "curve": "ed25519"},
        {"path": ["m", "1852'", "1815'"], "curve": "ed25519Bip32"},
    ]);
    grants.grant(
        keel_capabilities::CapabilityGrant::for_snap(
            mock_plugin_id(),
            RestrictedTarget::GetBip32Entropy,
            &[keel_capabilities::Caveat::new(
                "permittedDerivationPaths",
                entries,
            )],
        )
        .unwrap(),
    );
    PermissionPipeline::new(grants, hooks)
}

#[tokio::test]
async fn test_seed_curves_never_touch_the_mnemonic() {
    for (path, curve) in [
        (["m", "44'", "1'"], "secp256k1"),
        (["m", "44'", "501'"], "ed25519"),
    ] {
        let hooks = Arc::new(MockHooks::new());
        let pipeline = direct_pipeline(Arc::clone(&hooks));
        let node = pipeline
            .invoke(
                &mock_plugin_id(),
                "snap_getBip32Entropy",
                Some(&derivation_params(&path, curve)),
                InvocationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(node["curve"], curve);
        assert!(!hooks.mnemonic_requested());
        assert!(hooks.calls().contains(&HookCall::Seed(None)));
    }
}

#[tokio::test]
async fn test_other_curves_use_the_mnemonic() {
    let hooks = Arc::new(MockHooks::new());
    let pipeline = direct_pipeline(Arc::clone(&hooks));
    let node = pipeline
        .invoke(
            &mock_plugin_id(),
            "snap_getBip32Entropy",
            Some(&derivation_params(&["m", "1852'", "1815'"], "ed25519Bip32")),
            InvocationOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(node["curve"], "ed25519Bip32");
    assert!(hooks.mnemonic_requested());
    assert!(!hooks.calls().iter().any(|c| matches!(c, HookCall::Seed(_))));
}

#[tokio::test]
async fn test_unsupported_curve() {
    let hooks = Arc::new(MockHooks::new());
    let pipeline = direct_pipeline(Arc::clone(&hooks));
    let err = pipeline
        .invoke(
            &mock_plugin_id(),
            "snap_getBip32Entropy",
            Some(&derivation_params(&["m", "44'", "1'"], "p256")),
            InvocationOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::UnsupportedCurve(_)));
    assert!(hooks.calls().is_empty());
}
