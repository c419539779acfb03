//! SLIP-10 over ed25519. Only hardened children exist on this curve.

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use crate::backend::CryptographicFunctions;
use crate::curve::Curve;
use crate::error::{CryptoError, CryptoResult};
use crate::node::{KeyParts, PrivateNode};
use crate::path::ChildIndex;

const MASTER_KEY: &[u8] = b"ed25519 seed";

fn parts(i: &[u8; 64]) -> KeyParts {
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&i[..32]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&i[32..]);

    let verifying = SigningKey::from_bytes(&secret).verifying_key();
    let mut public_key = Vec::with_capacity(33);
    public_key.push(0);
    public_key.extend_from_slice(verifying.as_bytes());

    KeyParts {
        chain_code,
        private_key: secret.to_vec(),
        compressed_public_key: public_key.clone(),
        public_key,
    }
}

pub(crate) fn master_from_seed(
    seed: &[u8],
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<PrivateNode> {
    if !(16..=64).contains(&seed.len()) {
        return Err(CryptoError::InvalidSeed(format!(
            "seed must be 16 to 64 bytes, got {}",
            seed.len()
        )));
    }
    let i = backend.hmac_sha512(MASTER_KEY, seed)?;
    Ok(PrivateNode::master(Curve::Ed25519, parts(&i)))
}

pub(crate) fn child_parts(
    private_key: &[u8],
    chain_code: &[u8; 32],
    index: ChildIndex,
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<KeyParts> {
    if !index.is_hardened() {
        return Err(CryptoError::InvalidPath(format!(
            "ed25519 only supports hardened derivation, got {index}"
        )));
    }
    let mut data = Zeroizing::new(Vec::with_capacity(37));
    data.push(0);
    data.extend_from_slice(private_key);
    data.extend_from_slice(&index.value().to_be_bytes());

    let i = backend.hmac_sha512(chain_code, &data)?;
    Ok(parts(&i))
}
