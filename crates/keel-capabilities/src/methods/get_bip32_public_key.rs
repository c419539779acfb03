//! `snap_getBip32PublicKey`: only the public key, as 0x-prefixed hex.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{DerivationRequest, RestrictedMethod, derive_node};
use crate::error::CapabilityResult;
use crate::hooks::MethodHooks;
use crate::target::RestrictedTarget;

/// Implementation of `snap_getBip32PublicKey`.
pub struct GetBip32PublicKey {
    hooks: Arc<dyn MethodHooks>,
}

impl GetBip32PublicKey {
    /// Build over the given hooks.
    #[must_use]
    pub fn new(hooks: Arc<dyn MethodHooks>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl RestrictedMethod for GetBip32PublicKey {
    fn target(&self) -> RestrictedTarget {
        RestrictedTarget::GetBip32PublicKey
    }

    async fn invoke(&self, request: &DerivationRequest) -> CapabilityResult<Value> {
        let node = derive_node(self.hooks.as_ref(), request).await?;
        let key = if request.compressed {
            node.compressed_public_key()
        } else {
            node.public_key()
        };
        Ok(Value::String(format!("0x{}", hex::encode(key))))
    }
}
