//! Entry points used by restricted methods: seed or mnemonic in, public node out.
//!
//! Secret inputs are borrowed for the duration of the call. Every
//! intermediate private node is wiped when it goes out of scope.

use crate::backend::{CryptographicFunctions, DefaultCryptography};
use crate::curve::Curve;
use crate::error::CryptoResult;
use crate::mnemonic::{mnemonic_to_entropy, mnemonic_to_seed};
use crate::node::{DerivedNode, PrivateNode};
use crate::path::DerivationPath;
use crate::cip3;

fn backend_or_default(
    backend: Option<&dyn CryptographicFunctions>,
) -> &dyn CryptographicFunctions {
    backend.unwrap_or(&DefaultCryptography)
}

/// Derive the node at `path` from a BIP-39 seed.
///
/// # Errors
///
/// Returns [`crate::CryptoError::UnsupportedCurve`] for curves that cannot
/// derive from a seed, or any path, seed or derivation error.
pub fn derive_from_seed(
    curve: Curve,
    seed: &[u8],
    path: &DerivationPath,
    backend: Option<&dyn CryptographicFunctions>,
) -> CryptoResult<DerivedNode> {
    let backend = backend_or_default(backend);
    path.check_curve(curve)?;
    let master = PrivateNode::from_seed(curve, seed, backend)?;
    Ok(master.derive_path(path, backend)?.neuter())
}

/// Derive the node at `path` from a UTF-8 encoded BIP-39 phrase.
///
/// `ed25519Bip32` builds its master key from the mnemonic entropy; the other
/// curves go through the BIP-39 seed.
///
/// # Errors
///
/// Returns [`crate::CryptoError::InvalidMnemonic`] for a bad phrase, or any
/// path or derivation error.
pub fn derive_from_mnemonic(
    curve: Curve,
    phrase: &[u8],
    path: &DerivationPath,
    backend: Option<&dyn CryptographicFunctions>,
) -> CryptoResult<DerivedNode> {
    let backend = backend_or_default(backend);
    path.check_curve(curve)?;
    let master = match curve {
        Curve::Ed25519Bip32 => {
            let entropy = mnemonic_to_entropy(phrase)?;
            cip3::master_from_entropy(&entropy, b"", backend)?
        },
        Curve::Secp256k1 | Curve::Ed25519 => {
            let seed = mnemonic_to_seed(phrase, "", backend)?;
            PrivateNode::from_seed(curve, &seed, backend)?
        },
    };
    Ok(master.derive_path(path, backend)?.neuter())
}
