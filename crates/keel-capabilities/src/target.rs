//! Static registry of restricted targets.
//!
//! Every restricted method is described once, as data: which caveat types it
//! accepts, which subject types may hold it, and how its caveat list is
//! validated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caveat::{Caveat, CaveatType, ValidatedCaveat};
use crate::error::{CapabilityError, CapabilityResult};

/// Kind of subject a grant is issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectType {
    /// A sandboxed plugin.
    Snap,
    /// A web origin.
    Website,
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snap => f.write_str("snap"),
            Self::Website => f.write_str("website"),
        }
    }
}

/// A restricted method that requires a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestrictedTarget {
    /// Derive a BIP-32 node (public material and metadata).
    #[serde(rename = "snap_getBip32Entropy")]
    GetBip32Entropy,
    /// Derive a BIP-32 public key.
    #[serde(rename = "snap_getBip32PublicKey")]
    GetBip32PublicKey,
}

/// Validates a target's raw caveat list.
pub type CaveatValidator = fn(&[Caveat]) -> CapabilityResult<Vec<ValidatedCaveat>>;

/// Static description of a restricted target.
#[derive(Debug)]
pub struct TargetDescriptor {
    /// The target.
    pub target: RestrictedTarget,
    /// Caveat types the target accepts.
    pub allowed_caveats: &'static [CaveatType],
    /// Subject types that may be granted the target.
    pub subject_types: &'static [SubjectType],
    /// Run once, at grant construction.
    pub validator: CaveatValidator,
}

static DESCRIPTORS: [TargetDescriptor; 2] = [
    TargetDescriptor {
        target: RestrictedTarget::GetBip32Entropy,
        allowed_caveats: &[CaveatType::PermittedDerivationPaths],
        subject_types: &[SubjectType::Snap],
        validator: single_permitted_derivation_paths,
    },
    TargetDescriptor {
        target: RestrictedTarget::GetBip32PublicKey,
        allowed_caveats: &[CaveatType::PermittedDerivationPaths],
        subject_types: &[SubjectType::Snap],
        validator: single_permitted_derivation_paths,
    },
];

/// Requires exactly one `permittedDerivationPaths` caveat.
fn single_permitted_derivation_paths(caveats: &[Caveat]) -> CapabilityResult<Vec<ValidatedCaveat>> {
    let expected = CaveatType::PermittedDerivationPaths;
    match caveats {
        [only] if only.caveat_type == expected.as_str() => {
            Ok(vec![ValidatedCaveat::from_raw(only)?])
        },
        _ => Err(CapabilityError::InvalidCaveats(format!(
            "Expected a single \"{expected}\" caveat."
        ))),
    }
}

impl RestrictedTarget {
    /// All restricted targets.
    pub const ALL: [Self; 2] = [Self::GetBip32Entropy, Self::GetBip32PublicKey];

    /// Method name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GetBip32Entropy => "snap_getBip32Entropy",
            Self::GetBip32PublicKey => "snap_getBip32PublicKey",
        }
    }

    /// Static descriptor of this target.
    #[must_use]
    pub fn descriptor(self) -> &'static TargetDescriptor {
        match self {
            Self::GetBip32Entropy => &DESCRIPTORS[0],
            Self::GetBip32PublicKey => &DESCRIPTORS[1],
        }
    }
}

impl fmt::Display for RestrictedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RestrictedTarget {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| CapabilityError::UnknownTarget(s.to_string()))
    }
}

impl TargetDescriptor {
    /// Validate a caveat list for this target.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidCaveats`] if a caveat type is not
    /// allowed or the target's validator rejects the list.
    pub fn validate(&self, caveats: &[Caveat]) -> CapabilityResult<Vec<ValidatedCaveat>> {
        for caveat in caveats {
            let ty: CaveatType = caveat.caveat_type.parse()?;
            if !self.allowed_caveats.contains(&ty) {
                return Err(CapabilityError::InvalidCaveats(format!(
                    "caveat type \"{ty}\" is not allowed for {}",
                    self.target
                )));
            }
        }
        (self.validator)(caveats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths() -> Caveat {
        Caveat::new(
            "permittedDerivationPaths",
            json!([{"path": ["m", "44'", "1'"], "curve": "secp256k1"}]),
        )
    }

    #[test]
    fn test_descriptor_lookup() {
        for target in RestrictedTarget::ALL {
            assert_eq!(target.descriptor().target, target);
            assert_eq!(target.name().parse::<RestrictedTarget>().unwrap(), target);
        }
    }

    #[test]
    fn test_unknown_target() {
        assert!(matches!(
            "snap_dialog".parse::<RestrictedTarget>(),
            Err(CapabilityError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_validator_requires_exactly_one() {
        let descriptor = RestrictedTarget::GetBip32Entropy.descriptor();
        assert!(descriptor.validate(&[paths()]).is_ok());

        let err = descriptor.validate(&[]).unwrap_err();
        assert_eq!(
            err,
            CapabilityError::InvalidCaveats(
                "Expected a single \"permittedDerivationPaths\" caveat.".into()
            )
        );
        assert!(matches!(
            descriptor.validate(&[paths(), paths()]),
            Err(CapabilityError::InvalidCaveats(_))
        ));
    }

    #[test]
    fn test_validator_rejects_foreign_type() {
        let foreign = Caveat::new("permittedCoinTypes", json!([{"coinType": 1}]));
        assert!(matches!(
            RestrictedTarget::GetBip32PublicKey
                .descriptor()
                .validate(&[foreign]),
            Err(CapabilityError::InvalidCaveats(_))
        ));
    }

    #[test]
    fn test_target_serde_name() {
        assert_eq!(
            serde_json::to_value(RestrictedTarget::GetBip32Entropy).unwrap(),
            json!("snap_getBip32Entropy")
        );
    }
}
