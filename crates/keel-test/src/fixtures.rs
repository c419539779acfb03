//! Test fixtures for common values.

use keel_capabilities::{Caveat, CapabilityGrant, GrantStore, RestrictedTarget};
use keel_core::PluginId;
use serde_json::{Value, json};

/// Identity used by most tests.
pub const MOCK_PLUGIN_ID: &str = "npm:@keel/example-plugin";

/// Origin used by most tests.
pub const MOCK_ORIGIN: &str = "https://example.com";

/// A plugin whose `onRpcRequest` returns the request method with `"1"`
/// appended.
pub const DEFAULT_PLUGIN_SOURCE: &str =
    r#"module.exports.onRpcRequest = ({ request }) => request.method + "1";"#;

/// A plugin that throws while loading.
pub const CRASHING_PLUGIN_SOURCE: &str = r#"throw new Error("Crashed.");"#;

/// The BIP-39 test vector phrase.
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// [`MOCK_PLUGIN_ID`] as a [`PluginId`].
#[must_use]
pub fn mock_plugin_id() -> PluginId {
    test_plugin_id(MOCK_PLUGIN_ID)
}

/// A [`PluginId`] from a literal.
///
/// # Panics
///
/// Panics if `id` is not a valid plugin identity.
#[must_use]
pub fn test_plugin_id(id: &str) -> PluginId {
    PluginId::new(id).unwrap_or_else(|e| panic!("invalid test plugin id {id:?}: {e}"))
}

/// A `snap.request` params object for a BIP-32 derivation.
#[must_use]
pub fn derivation_params(path: &[&str], curve: &str) -> Value {
    json!({ "path": path, "curve": curve })
}

/// A `permittedDerivationPaths` caveat allowing exactly one `{path, curve}`.
#[must_use]
pub fn derivation_caveat(path: &[&str], curve: &str) -> Caveat {
    Caveat::new(
        "permittedDerivationPaths",
        json!([derivation_params(path, curve)]),
    )
}

/// Grant `subject` `target` restricted to one path, storing it in `store`.
///
/// # Panics
///
/// Panics if the caveat is rejected.
pub fn grant_derivation(
    store: &GrantStore,
    subject: &PluginId,
    target: RestrictedTarget,
    path: &[&str],
    curve: &str,
) {
    let grant = CapabilityGrant::for_snap(subject.clone(), target, &[derivation_caveat(path, curve)])
        .unwrap_or_else(|e| panic!("test grant rejected: {e}"));
    store.grant(grant);
}
