//! Private and public derivation nodes.

use ripemd::Ripemd160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::backend::CryptographicFunctions;
use crate::curve::Curve;
use crate::error::{CryptoError, CryptoResult};
use crate::path::{ChildIndex, DerivationPath};
use crate::{cip3, secp256k1, slip10};

/// First four bytes of HASH160 (RIPEMD-160 over SHA-256) of a public key.
#[must_use]
pub fn fingerprint(compressed_public_key: &[u8]) -> u32 {
    let sha = Sha256::digest(compressed_public_key);
    let hash = Ripemd160::digest(sha);
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
}

/// A node holding private key material.
///
/// Never leaves the host. The key material is wiped on drop; only
/// [`PrivateNode::neuter`] produces something that may be handed out.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateNode {
    #[zeroize(skip)]
    curve: Curve,
    depth: u8,
    index: u32,
    parent_fingerprint: u32,
    master_fingerprint: u32,
    chain_code: [u8; 32],
    /// 32 bytes, or `kL || kR` (64 bytes) for BIP32-Ed25519.
    private_key: Vec<u8>,
    public_key: Vec<u8>,
    compressed_public_key: Vec<u8>,
}

/// Public parts of a freshly derived key, produced by each scheme.
pub(crate) struct KeyParts {
    pub(crate) chain_code: [u8; 32],
    pub(crate) private_key: Vec<u8>,
    pub(crate) public_key: Vec<u8>,
    pub(crate) compressed_public_key: Vec<u8>,
}

impl Drop for KeyParts {
    fn drop(&mut self) {
        self.chain_code.zeroize();
        self.private_key.zeroize();
    }
}

impl PrivateNode {
    pub(crate) fn master(curve: Curve, mut parts: KeyParts) -> Self {
        let fp = fingerprint(&parts.compressed_public_key);
        Self {
            curve,
            depth: 0,
            index: 0,
            parent_fingerprint: 0,
            master_fingerprint: fp,
            chain_code: parts.chain_code,
            private_key: std::mem::take(&mut parts.private_key),
            public_key: std::mem::take(&mut parts.public_key),
            compressed_public_key: std::mem::take(&mut parts.compressed_public_key),
        }
    }

    fn child(&self, index: ChildIndex, mut parts: KeyParts) -> CryptoResult<Self> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| CryptoError::Derivation("maximum depth exceeded".into()))?;
        Ok(Self {
            curve: self.curve,
            depth,
            index: index.value(),
            parent_fingerprint: self.fingerprint(),
            master_fingerprint: self.master_fingerprint,
            chain_code: parts.chain_code,
            private_key: std::mem::take(&mut parts.private_key),
            public_key: std::mem::take(&mut parts.public_key),
            compressed_public_key: std::mem::take(&mut parts.compressed_public_key),
        })
    }

    /// Master node for `curve` from a BIP-39 seed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedCurve`] for curves that need the
    /// mnemonic, and [`CryptoError::InvalidSeed`] for an unusable seed.
    pub fn from_seed(
        curve: Curve,
        seed: &[u8],
        backend: &dyn CryptographicFunctions,
    ) -> CryptoResult<Self> {
        match curve {
            Curve::Secp256k1 => secp256k1::master_from_seed(seed, backend),
            Curve::Ed25519 => slip10::master_from_seed(seed, backend),
            Curve::Ed25519Bip32 => Err(CryptoError::UnsupportedCurve(format!(
                "{curve} cannot be derived from a seed"
            ))),
        }
    }

    /// Derive one child.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] for a non-hardened index on a
    /// hardened-only curve, or [`CryptoError::Derivation`] if the child key is
    /// invalid.
    pub fn derive_child(
        &self,
        index: ChildIndex,
        backend: &dyn CryptographicFunctions,
    ) -> CryptoResult<Self> {
        let parts = match self.curve {
            Curve::Secp256k1 => {
                secp256k1::child_parts(&self.private_key, &self.chain_code, index, backend)?
            },
            Curve::Ed25519 => {
                slip10::child_parts(&self.private_key, &self.chain_code, index, backend)?
            },
            Curve::Ed25519Bip32 => cip3::child_parts(
                &self.private_key,
                &self.public_key,
                &self.chain_code,
                index,
                backend,
            )?,
        };
        self.child(index, parts)
    }

    /// Derive along every segment of `path`.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of [`PrivateNode::derive_child`].
    pub fn derive_path(
        &self,
        path: &DerivationPath,
        backend: &dyn CryptographicFunctions,
    ) -> CryptoResult<Self> {
        path.check_curve(self.curve)?;
        let mut segments = path.segments().iter();
        let Some(first) = segments.next() else {
            return Err(CryptoError::InvalidPath("path has no segments".into()));
        };
        let mut node = self.derive_child(*first, backend)?;
        for segment in segments {
            node = node.derive_child(*segment, backend)?;
        }
        Ok(node)
    }

    /// Curve of this node.
    #[must_use]
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Depth below the master node.
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Fingerprint of this node's public key.
    #[must_use]
    pub fn fingerprint(&self) -> u32 {
        fingerprint(&self.compressed_public_key)
    }

    /// Chain code.
    #[must_use]
    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Private key bytes. Host-side use only.
    #[must_use]
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Public half of this node.
    #[must_use]
    pub fn neuter(&self) -> DerivedNode {
        DerivedNode {
            curve: self.curve,
            depth: self.depth,
            index: self.index,
            parent_fingerprint: self.parent_fingerprint,
            master_fingerprint: self.master_fingerprint,
            chain_code: self.chain_code,
            public_key: self.public_key.clone(),
            compressed_public_key: self.compressed_public_key.clone(),
        }
    }
}

impl std::fmt::Debug for PrivateNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateNode")
            .field("curve", &self.curve)
            .field("depth", &self.depth)
            .field("index", &self.index)
            .field("fingerprint", &format_args!("{:08x}", self.fingerprint()))
            .finish_non_exhaustive()
    }
}

/// Public key material of a derived node, safe to return to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNode {
    curve: Curve,
    depth: u8,
    index: u32,
    parent_fingerprint: u32,
    master_fingerprint: u32,
    chain_code: [u8; 32],
    public_key: Vec<u8>,
    compressed_public_key: Vec<u8>,
}

impl DerivedNode {
    /// Curve of this node.
    #[must_use]
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Depth below the master node.
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Child number (hardened bit included).
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Fingerprint of the parent node (0 for a master node).
    #[must_use]
    pub fn parent_fingerprint(&self) -> u32 {
        self.parent_fingerprint
    }

    /// Fingerprint of the master node.
    #[must_use]
    pub fn master_fingerprint(&self) -> u32 {
        self.master_fingerprint
    }

    /// Fingerprint of this node.
    #[must_use]
    pub fn fingerprint(&self) -> u32 {
        fingerprint(&self.compressed_public_key)
    }

    /// Chain code.
    #[must_use]
    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Public key in the curve's full form (uncompressed for secp256k1).
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Compressed public key.
    #[must_use]
    pub fn compressed_public_key(&self) -> &[u8] {
        &self.compressed_public_key
    }

    /// Derive a non-hardened child from public material only.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] for hardened indexes or curves
    /// without public derivation, or [`CryptoError::Derivation`] if the child
    /// key is invalid.
    pub fn derive_public_child(
        &self,
        index: ChildIndex,
        backend: &dyn CryptographicFunctions,
    ) -> CryptoResult<Self> {
        if index.is_hardened() {
            return Err(CryptoError::InvalidPath(
                "hardened children need the private key".into(),
            ));
        }
        let (chain_code, public_key, compressed_public_key) = match self.curve {
            Curve::Secp256k1 => secp256k1::public_child(
                &self.compressed_public_key,
                &self.chain_code,
                index,
                backend,
            )?,
            Curve::Ed25519Bip32 => {
                cip3::public_child(&self.public_key, &self.chain_code, index, backend)?
            },
            Curve::Ed25519 => {
                return Err(CryptoError::InvalidPath(
                    "ed25519 has no public derivation".into(),
                ));
            },
        };
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| CryptoError::Derivation("maximum depth exceeded".into()))?;
        Ok(Self {
            curve: self.curve,
            depth,
            index: index.value(),
            parent_fingerprint: self.fingerprint(),
            master_fingerprint: self.master_fingerprint,
            chain_code,
            public_key,
            compressed_public_key,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeJson {
    depth: u8,
    master_fingerprint: u32,
    parent_fingerprint: u32,
    index: u32,
    curve: Curve,
    public_key: String,
    compressed_public_key: String,
    chain_code: String,
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn from_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("expected 0x-prefixed hex, got {s:?}"))?;
    hex::decode(digits).map_err(|e| e.to_string())
}

impl Serialize for DerivedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeJson {
            depth: self.depth,
            master_fingerprint: self.master_fingerprint,
            parent_fingerprint: self.parent_fingerprint,
            index: self.index,
            curve: self.curve,
            public_key: to_hex(&self.public_key),
            compressed_public_key: to_hex(&self.compressed_public_key),
            chain_code: to_hex(&self.chain_code),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DerivedNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let json = NodeJson::deserialize(deserializer)?;
        let chain_code: [u8; 32] = from_hex(&json.chain_code)
            .map_err(D::Error::custom)?
            .try_into()
            .map_err(|_| D::Error::custom("chain code must be 32 bytes"))?;
        Ok(Self {
            curve: json.curve,
            depth: json.depth,
            index: json.index,
            parent_fingerprint: json.parent_fingerprint,
            master_fingerprint: json.master_fingerprint,
            chain_code,
            public_key: from_hex(&json.public_key).map_err(D::Error::custom)?,
            compressed_public_key: from_hex(&json.compressed_public_key)
                .map_err(D::Error::custom)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultCryptography;

    const TV1_SEED: &str = "000102030405060708090a0b0c0d0e0f";

    fn master() -> PrivateNode {
        let seed = hex::decode(TV1_SEED).unwrap();
        PrivateNode::from_seed(Curve::Secp256k1, &seed, &DefaultCryptography).unwrap()
    }

    #[test]
    fn test_json_never_contains_private_key() {
        let node = master();
        let json = serde_json::to_value(node.neuter()).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("privateKey"));
        assert!(
            !json
                .to_string()
                .contains(&hex::encode(node.private_key()))
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(master().neuter()).unwrap();
        assert_eq!(json["depth"], 0);
        assert_eq!(json["index"], 0);
        assert_eq!(json["parentFingerprint"], 0);
        assert_eq!(json["masterFingerprint"], 0x3442_193e);
        assert_eq!(json["curve"], "secp256k1");
        assert!(json["publicKey"].as_str().unwrap().starts_with("0x04"));
        assert_eq!(json["publicKey"].as_str().unwrap().len(), 2 + 130);
        assert_eq!(
            json["compressedPublicKey"],
            "0x0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
    }

    #[test]
    fn test_json_deserializes_back() {
        let node = master().neuter();
        let json = serde_json::to_string(&node).unwrap();
        let parsed: DerivedNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_child_metadata() {
        let root = master();
        let child = root
            .derive_child(ChildIndex::hardened(0).unwrap(), &DefaultCryptography)
            .unwrap();
        assert_eq!(child.depth(), 1);
        let public = child.neuter();
        assert_eq!(public.index(), 0x8000_0000);
        assert_eq!(public.parent_fingerprint(), root.fingerprint());
        assert_eq!(public.master_fingerprint(), root.fingerprint());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let node = master();
        let debug = format!("{node:?}");
        assert!(!debug.contains(&hex::encode(node.private_key())));
    }
}
