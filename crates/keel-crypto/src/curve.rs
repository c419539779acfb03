//! Supported derivation curves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// A curve keys can be derived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    /// BIP-32 over secp256k1.
    #[serde(rename = "secp256k1")]
    Secp256k1,
    /// SLIP-10 over ed25519 (hardened derivation only).
    #[serde(rename = "ed25519")]
    Ed25519,
    /// BIP32-Ed25519 over a CIP-3 master key.
    #[serde(rename = "ed25519Bip32")]
    Ed25519Bip32,
}

impl Curve {
    /// All supported curves.
    pub const ALL: [Self; 3] = [Self::Secp256k1, Self::Ed25519, Self::Ed25519Bip32];

    /// Wire identifier of the curve.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secp256k1 => "secp256k1",
            Self::Ed25519 => "ed25519",
            Self::Ed25519Bip32 => "ed25519Bip32",
        }
    }

    /// Whether nodes on this curve can be derived straight from a BIP-39 seed.
    ///
    /// Other curves need the mnemonic itself.
    #[must_use]
    pub fn derives_from_seed(self) -> bool {
        matches!(self, Self::Secp256k1 | Self::Ed25519)
    }

    /// Whether non-hardened child indexes are allowed.
    #[must_use]
    pub fn supports_unhardened(self) -> bool {
        !matches!(self, Self::Ed25519)
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Curve {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CryptoError::UnsupportedCurve(s.to_string()))
    }
}
