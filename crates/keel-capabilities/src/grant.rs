//! Capability grants.

use chrono::{DateTime, Utc};
use keel_core::PluginId;

use crate::caveat::{Bip32Entity, Caveat, ValidatedCaveat};
use crate::error::{CapabilityError, CapabilityResult};
use crate::target::{RestrictedTarget, SubjectType};

/// Authorization for one subject to invoke one restricted target.
///
/// Caveats are validated in [`CapabilityGrant::new`]; a grant that exists is
/// always well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityGrant {
    subject: PluginId,
    subject_type: SubjectType,
    target: RestrictedTarget,
    caveats: Vec<ValidatedCaveat>,
    granted_at: DateTime<Utc>,
}

impl CapabilityGrant {
    /// Construct a grant, validating its caveats against the target.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidCaveats`] if the target's validator
    /// rejects `caveats`, or [`CapabilityError::SubjectTypeNotAllowed`] if the
    /// target cannot be granted to `subject_type`.
    pub fn new(
        subject: PluginId,
        subject_type: SubjectType,
        target: RestrictedTarget,
        caveats: &[Caveat],
    ) -> CapabilityResult<Self> {
        let descriptor = target.descriptor();
        if !descriptor.subject_types.contains(&subject_type) {
            return Err(CapabilityError::SubjectTypeNotAllowed {
                subject_type: subject_type.to_string(),
                target: target.to_string(),
            });
        }
        let caveats = descriptor.validate(caveats)?;
        Ok(Self {
            subject,
            subject_type,
            target,
            caveats,
            granted_at: Utc::now(),
        })
    }

    /// Grant for a plugin subject.
    ///
    /// # Errors
    ///
    /// See [`CapabilityGrant::new`].
    pub fn for_snap(
        subject: PluginId,
        target: RestrictedTarget,
        caveats: &[Caveat],
    ) -> CapabilityResult<Self> {
        Self::new(subject, SubjectType::Snap, target, caveats)
    }

    /// The subject holding this grant.
    #[must_use]
    pub fn subject(&self) -> &PluginId {
        &self.subject
    }

    /// Kind of subject.
    #[must_use]
    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    /// The granted target.
    #[must_use]
    pub fn target(&self) -> RestrictedTarget {
        self.target
    }

    /// Validated caveats, in declaration order.
    #[must_use]
    pub fn caveats(&self) -> &[ValidatedCaveat] {
        &self.caveats
    }

    /// When the grant was constructed.
    #[must_use]
    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    /// Derivation entries this grant permits, if it restricts derivation.
    #[must_use]
    pub fn permitted_derivation_paths(&self) -> Option<&[Bip32Entity]> {
        self.caveats.iter().find_map(|c| match c {
            ValidatedCaveat::PermittedDerivationPaths(entries) => Some(entries.as_slice()),
        })
    }

    /// Check that `requested` falls inside this grant's caveats.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::PermissionDenied`] if no permitted entry
    /// matches both path and curve.
    pub fn authorize(&self, requested: &Bip32Entity) -> CapabilityResult<()> {
        let permitted = self.permitted_derivation_paths().unwrap_or_default();
        if permitted.iter().any(|entry| entry == requested) {
            return Ok(());
        }
        Err(CapabilityError::PermissionDenied {
            target: self.target.to_string(),
            message: format!(
                "the requested path {} on {} is not among the permitted paths",
                requested.path, requested.curve
            ),
        })
    }
}
