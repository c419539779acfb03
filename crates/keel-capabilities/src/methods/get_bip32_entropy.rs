//! `snap_getBip32Entropy`: the derived node as JSON.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{DerivationRequest, RestrictedMethod, derive_node};
use crate::error::{CapabilityError, CapabilityResult};
use crate::hooks::MethodHooks;
use crate::target::RestrictedTarget;

/// Implementation of `snap_getBip32Entropy`.
pub struct GetBip32Entropy {
    hooks: Arc<dyn MethodHooks>,
}

impl GetBip32Entropy {
    /// Build over the given hooks.
    #[must_use]
    pub fn new(hooks: Arc<dyn MethodHooks>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl RestrictedMethod for GetBip32Entropy {
    fn target(&self) -> RestrictedTarget {
        RestrictedTarget::GetBip32Entropy
    }

    async fn invoke(&self, request: &DerivationRequest) -> CapabilityResult<Value> {
        let node = derive_node(self.hooks.as_ref(), request).await?;
        serde_json::to_value(node).map_err(|e| CapabilityError::Derivation(e.to_string()))
    }
}
