//! Hooks the surrounding application supplies to restricted methods.
//!
//! Secrets are fetched through these hooks just-in-time, for one call, and
//! are wiped when the returned buffers are dropped.

use std::sync::Arc;

use async_trait::async_trait;
use keel_crypto::CryptographicFunctions;
use thiserror::Error;
use zeroize::Zeroizing;

/// Failure reported by a hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// No entropy source with this id exists.
    #[error("no entropy source with id \"{0}\"")]
    UnknownSource(String),
    /// The user declined, or the wallet stayed locked.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Application-supplied hooks.
///
/// `source` selects an entropy source; `None` means the primary one.
#[async_trait]
pub trait MethodHooks: Send + Sync {
    /// UTF-8 encoded BIP-39 phrase of `source`.
    async fn get_mnemonic(&self, source: Option<&str>) -> Result<Zeroizing<Vec<u8>>, HookError>;

    /// BIP-39 seed of `source`.
    async fn get_mnemonic_seed(
        &self,
        source: Option<&str>,
    ) -> Result<Zeroizing<Vec<u8>>, HookError>;

    /// Resolves once the application is unlocked. With `should_prompt`, the
    /// user is asked to unlock if needed.
    async fn get_unlock_promise(&self, should_prompt: bool) -> Result<(), HookError>;

    /// Alternative cryptographic backend. `None` uses the default one.
    fn get_cryptographic_backend(&self) -> Option<Arc<dyn CryptographicFunctions>> {
        None
    }
}
