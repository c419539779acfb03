//! In-memory grant storage.

use std::sync::Arc;

use dashmap::DashMap;
use keel_core::PluginId;
use tracing::debug;

use crate::grant::CapabilityGrant;
use crate::target::RestrictedTarget;

/// Grants held by each subject, keyed by `(subject, target)`.
///
/// Grants are read-only once stored; replacing one swaps the whole grant.
#[derive(Debug, Default)]
pub struct GrantStore {
    grants: DashMap<(PluginId, RestrictedTarget), Arc<CapabilityGrant>>,
}

impl GrantStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store a grant, returning the one it replaced.
    pub fn grant(&self, grant: CapabilityGrant) -> Option<Arc<CapabilityGrant>> {
        let key = (grant.subject().clone(), grant.target());
        debug!(subject = %key.0, target = %key.1, "Capability granted");
        self.grants.insert(key, Arc::new(grant))
    }

    /// Remove a subject's grant for `target`. Returns whether one existed.
    pub fn revoke(&self, subject: &PluginId, target: RestrictedTarget) -> bool {
        let removed = self.grants.remove(&(subject.clone(), target)).is_some();
        if removed {
            debug!(subject = %subject, target = %target, "Capability revoked");
        }
        removed
    }

    /// Remove every grant held by `subject`. Returns how many were removed.
    pub fn revoke_all(&self, subject: &PluginId) -> usize {
        let before = self.grants.len();
        self.grants.retain(|(s, _), _| s != subject);
        before.saturating_sub(self.grants.len())
    }

    /// The subject's grant for `target`, if any.
    #[must_use]
    pub fn get(&self, subject: &PluginId, target: RestrictedTarget) -> Option<Arc<CapabilityGrant>> {
        self.grants
            .get(&(subject.clone(), target))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `subject` holds a grant for `target`.
    #[must_use]
    pub fn has_permission(&self, subject: &PluginId, target: RestrictedTarget) -> bool {
        self.grants.contains_key(&(subject.clone(), target))
    }

    /// Every grant held by `subject`.
    #[must_use]
    pub fn grants_for(&self, subject: &PluginId) -> Vec<Arc<CapabilityGrant>> {
        self.grants
            .iter()
            .filter(|entry| &entry.key().0 == subject)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Total number of grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caveat::Caveat;
    use serde_json::json;

    fn grant(subject: &str, target: RestrictedTarget) -> CapabilityGrant {
        CapabilityGrant::for_snap(
            PluginId::new(subject).unwrap(),
            target,
            &[Caveat::new(
                "permittedDerivationPaths",
                json!([{"path": ["m", "44'", "0'"], "curve": "secp256k1"}]),
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_grant_and_lookup() {
        let store = GrantStore::in_memory();
        let subject = PluginId::new("npm:a").unwrap();
        assert!(!store.has_permission(&subject, RestrictedTarget::GetBip32Entropy));

        assert!(store.grant(grant("npm:a", RestrictedTarget::GetBip32Entropy)).is_none());
        assert!(store.has_permission(&subject, RestrictedTarget::GetBip32Entropy));
        assert!(!store.has_permission(&subject, RestrictedTarget::GetBip32PublicKey));
        assert!(store.get(&subject, RestrictedTarget::GetBip32Entropy).is_some());
    }

    #[test]
    fn test_regrant_replaces() {
        let store = GrantStore::in_memory();
        store.grant(grant("npm:a", RestrictedTarget::GetBip32Entropy));
        assert!(store.grant(grant("npm:a", RestrictedTarget::GetBip32Entropy)).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_revoke() {
        let store = GrantStore::in_memory();
        let subject = PluginId::new("npm:a").unwrap();
        store.grant(grant("npm:a", RestrictedTarget::GetBip32Entropy));

        assert!(store.revoke(&subject, RestrictedTarget::GetBip32Entropy));
        assert!(!store.revoke(&subject, RestrictedTarget::GetBip32Entropy));
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke_all_is_per_subject() {
        let store = GrantStore::in_memory();
        store.grant(grant("npm:a", RestrictedTarget::GetBip32Entropy));
        store.grant(grant("npm:a", RestrictedTarget::GetBip32PublicKey));
        store.grant(grant("npm:b", RestrictedTarget::GetBip32Entropy));

        let a = PluginId::new("npm:a").unwrap();
        assert_eq!(store.grants_for(&a).len(), 2);
        assert_eq!(store.revoke_all(&a), 2);
        assert_eq!(store.len(), 1);
    }
}
