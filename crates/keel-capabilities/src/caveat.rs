//! Caveats: typed restrictions attached to a capability grant.
//!
//! A grant carries raw [`Caveat`]s as declared by the plugin manifest. They
//! are validated once, when the grant is constructed, into
//! [`ValidatedCaveat`]s. Invocation only ever sees the validated form.

use std::fmt;
use std::str::FromStr;

use keel_crypto::{Curve, DerivationPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CapabilityError, CapabilityResult};

/// A caveat as declared, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    /// Caveat type name, e.g. `permittedDerivationPaths`.
    #[serde(rename = "type")]
    pub caveat_type: String,
    /// Type-specific payload.
    pub value: Value,
}

impl Caveat {
    /// Create a raw caveat.
    #[must_use]
    pub fn new(caveat_type: impl Into<String>, value: Value) -> Self {
        Self {
            caveat_type: caveat_type.into(),
            value,
        }
    }

    /// A `permittedDerivationPaths` caveat over `entries`.
    #[must_use]
    pub fn permitted_derivation_paths(entries: &[Bip32Entity]) -> Self {
        let value = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "path": e.path.to_strings(),
                    "curve": e.curve.as_str(),
                })
            })
            .collect();
        Self::new(
            CaveatType::PermittedDerivationPaths.as_str(),
            Value::Array(value),
        )
    }
}

/// Known caveat types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaveatType {
    /// Restricts key derivation to a list of `{path, curve}` entries.
    PermittedDerivationPaths,
}

impl CaveatType {
    /// Wire name of the caveat type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermittedDerivationPaths => "permittedDerivationPaths",
        }
    }
}

impl fmt::Display for CaveatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaveatType {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permittedDerivationPaths" => Ok(Self::PermittedDerivationPaths),
            other => Err(CapabilityError::InvalidCaveats(format!(
                "unknown caveat type {other:?}"
            ))),
        }
    }
}

/// A derivation path together with the curve it is derived on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bip32Entity {
    /// Derivation path, `m` first.
    pub path: DerivationPath,
    /// Curve identifier.
    pub curve: Curve,
}

impl Bip32Entity {
    /// Parse from raw segment strings and a curve name.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::UnsupportedCurve`] for unknown curves and
    /// [`CapabilityError::InvalidParams`] for malformed paths, including
    /// non-hardened segments on hardened-only curves.
    pub fn parse<S: AsRef<str>>(path: &[S], curve: &str) -> CapabilityResult<Self> {
        let curve: Curve = curve.parse()?;
        let path = DerivationPath::parse(path)?;
        path.check_curve(curve)?;
        Ok(Self { path, curve })
    }
}

#[derive(Deserialize)]
struct RawEntity {
    path: Vec<String>,
    curve: String,
}

/// A caveat that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedCaveat {
    /// Derivation is limited to these entries.
    PermittedDerivationPaths(Vec<Bip32Entity>),
}

impl ValidatedCaveat {
    /// Validate a raw caveat's type and value.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidCaveats`] if the type is unknown or
    /// the value is malformed.
    pub fn from_raw(caveat: &Caveat) -> CapabilityResult<Self> {
        match caveat.caveat_type.parse::<CaveatType>()? {
            CaveatType::PermittedDerivationPaths => {
                let raw: Vec<RawEntity> = serde_json::from_value(caveat.value.clone())
                    .map_err(|e| {
                        CapabilityError::InvalidCaveats(format!(
                            "\"{}\" value must be an array of {{path, curve}}: {e}",
                            CaveatType::PermittedDerivationPaths
                        ))
                    })?;
                if raw.is_empty() {
                    return Err(CapabilityError::InvalidCaveats(format!(
                        "\"{}\" must list at least one path",
                        CaveatType::PermittedDerivationPaths
                    )));
                }
                let entries = raw
                    .iter()
                    .map(|e| {
                        Bip32Entity::parse(&e.path, &e.curve)
                            .map_err(|err| CapabilityError::InvalidCaveats(err.to_string()))
                    })
                    .collect::<CapabilityResult<Vec<_>>>()?;
                Ok(Self::PermittedDerivationPaths(entries))
            },
        }
    }

    /// Type of this caveat.
    #[must_use]
    pub fn caveat_type(&self) -> CaveatType {
        match self {
            Self::PermittedDerivationPaths(_) => CaveatType::PermittedDerivationPaths,
        }
    }
}
