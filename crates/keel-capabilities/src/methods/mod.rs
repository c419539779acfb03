//! Restricted-method implementations.
//!
//! Implementations are built from the hooks at pipeline construction and only
//! ever see validated, already authorized requests.

mod get_bip32_entropy;
mod get_bip32_public_key;

use std::sync::Arc;

use async_trait::async_trait;
use keel_crypto::{DerivedNode, derive_from_mnemonic, derive_from_seed};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::caveat::Bip32Entity;
use crate::error::{CapabilityError, CapabilityResult};
use crate::hooks::MethodHooks;
use crate::target::RestrictedTarget;

pub use get_bip32_entropy::GetBip32Entropy;
pub use get_bip32_public_key::GetBip32PublicKey;

/// An invocable restricted method.
#[async_trait]
pub trait RestrictedMethod: Send + Sync {
    /// The target this method implements.
    fn target(&self) -> RestrictedTarget;

    /// Run the method on an authorized request.
    async fn invoke(&self, request: &DerivationRequest) -> CapabilityResult<Value>;
}

/// Build the implementation of `target`.
#[must_use]
pub fn build(target: RestrictedTarget, hooks: Arc<dyn MethodHooks>) -> Arc<dyn RestrictedMethod> {
    match target {
        RestrictedTarget::GetBip32Entropy => Arc::new(GetBip32Entropy::new(hooks)),
        RestrictedTarget::GetBip32PublicKey => Arc::new(GetBip32PublicKey::new(hooks)),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParams {
    path: Vec<String>,
    curve: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    compressed: bool,
}

/// Parameters of a derivation request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationRequest {
    /// Requested path and curve.
    pub entity: Bip32Entity,
    /// Entropy source id; `None` for the primary source.
    pub source: Option<String>,
    /// Whether a public key should be returned compressed.
    pub compressed: bool,
}

impl DerivationRequest {
    /// Parse request params `{path, curve, source?, compressed?}`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidParams`] for malformed params and
    /// [`CapabilityError::UnsupportedCurve`] for unknown curves.
    pub fn from_params(params: Option<&Value>) -> CapabilityResult<Self> {
        let params =
            params.ok_or_else(|| CapabilityError::InvalidParams("params are required".into()))?;
        let raw: RawParams = serde_json::from_value(params.clone())
            .map_err(|e| CapabilityError::InvalidParams(e.to_string()))?;
        Ok(Self {
            entity: Bip32Entity::parse(&raw.path, &raw.curve)?,
            source: raw.source,
            compressed: raw.compressed,
        })
    }
}

/// Fetch secrets through the hooks and derive the requested node.
///
/// Seed-capable curves use the seed hook; the others use the mnemonic hook.
/// The secret buffer is moved into the blocking task and wiped when it ends.
pub(crate) async fn derive_node(
    hooks: &dyn MethodHooks,
    request: &DerivationRequest,
) -> CapabilityResult<DerivedNode> {
    let curve = request.entity.curve;
    let path = request.entity.path.clone();
    let source = request.source.as_deref();
    let backend = hooks.get_cryptographic_backend();

    let from_seed = curve.derives_from_seed();
    let secret = if from_seed {
        hooks.get_mnemonic_seed(source).await
    } else {
        hooks.get_mnemonic(source).await
    }
    .map_err(|e| CapabilityError::EntropySource(e.to_string()))?;

    debug!(%curve, %path, from_seed, "Deriving node");

    tokio::task::spawn_blocking(move || {
        if from_seed {
            derive_from_seed(curve, &secret, &path, backend.as_deref())
        } else {
            derive_from_mnemonic(curve, &secret, &path, backend.as_deref())
        }
    })
    .await
    .map_err(|e| CapabilityError::Derivation(format!("derivation task failed: {e}")))?
    .map_err(CapabilityError::from)
}
