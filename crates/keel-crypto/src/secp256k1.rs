//! BIP-32 over secp256k1.

use k256::elliptic_curve::PrimeField;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey};
use zeroize::Zeroizing;

use crate::backend::CryptographicFunctions;
use crate::curve::Curve;
use crate::error::{CryptoError, CryptoResult};
use crate::node::{KeyParts, PrivateNode};
use crate::path::ChildIndex;

const MASTER_KEY: &[u8] = b"Bitcoin seed";

fn split(i: &[u8; 64]) -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let mut left = Zeroizing::new([0u8; 32]);
    let mut right = [0u8; 32];
    left.copy_from_slice(&i[..32]);
    right.copy_from_slice(&i[32..]);
    (left, right)
}

fn parse_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
}

fn public_parts(secret: &SecretKey) -> (Vec<u8>, Vec<u8>) {
    let public = secret.public_key();
    (
        public.to_encoded_point(false).as_bytes().to_vec(),
        public.to_encoded_point(true).as_bytes().to_vec(),
    )
}

fn parts_from_secret(secret: &SecretKey, chain_code: [u8; 32]) -> KeyParts {
    let (public_key, compressed_public_key) = public_parts(secret);
    KeyParts {
        chain_code,
        private_key: secret.to_bytes().to_vec(),
        public_key,
        compressed_public_key,
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
    let (key, chain_code) = split(&i);
    let secret = SecretKey::from_slice(key.as_slice())
        .map_err(|_| CryptoError::InvalidSeed("master key is not a valid scalar".into()))?;
    Ok(PrivateNode::master(
        Curve::Secp256k1,
        parts_from_secret(&secret, chain_code),
    ))
}

pub(crate) fn child_parts(
    private_key: &[u8],
    chain_code: &[u8; 32],
    index: ChildIndex,
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<KeyParts> {
    let parent = SecretKey::from_slice(private_key)
        .map_err(|_| CryptoError::Derivation("parent key is invalid".into()))?;

    let mut data = Zeroizing::new(Vec::with_capacity(37));
    if index.is_hardened() {
        data.push(0);
        data.extend_from_slice(private_key);
    } else {
        data.extend_from_slice(parent.public_key().to_encoded_point(true).as_bytes());
    }
    data.extend_from_slice(&index.value().to_be_bytes());

    let i = backend.hmac_sha512(chain_code, &data)?;
    let (tweak, child_chain_code) = split(&i);
    let tweak = parse_scalar(&tweak)
        .ok_or_else(|| CryptoError::Derivation(format!("invalid tweak at index {index}")))?;

    #[allow(clippy::arithmetic_side_effects)] // scalar addition is mod n
    let child = tweak + *parent.to_nonzero_scalar();
    let child: NonZeroScalar = Option::from(NonZeroScalar::new(child))
        .ok_or_else(|| CryptoError::Derivation(format!("zero child key at index {index}")))?;
    let secret = SecretKey::from(child);

    Ok(parts_from_secret(&secret, child_chain_code))
}

pub(crate) fn public_child(
    compressed_public_key: &[u8],
    chain_code: &[u8; 32],
    index: ChildIndex,
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<([u8; 32], Vec<u8>, Vec<u8>)> {
    let parent = PublicKey::from_sec1_bytes(compressed_public_key)
        .map_err(|_| CryptoError::Derivation("parent public key is invalid".into()))?;

    let mut data = Vec::with_capacity(37);
    data.extend_from_slice(compressed_public_key);
    data.extend_from_slice(&index.value().to_be_bytes());

    let i = backend.hmac_sha512(chain_code, &data)?;
    let (tweak, child_chain_code) = split(&i);
    let tweak = parse_scalar(&tweak)
        .ok_or_else(|| CryptoError::Derivation(format!("invalid tweak at index {index}")))?;

    #[allow(clippy::arithmetic_side_effects)] // group operations
    let point = ProjectivePoint::GENERATOR * tweak + parent.to_projective();
    let child = PublicKey::from_affine(point.to_affine())
        .map_err(|_| CryptoError::Derivation(format!("child key at infinity, index {index}")))?;

    Ok((
        child_chain_code,
        child.to_encoded_point(false).as_bytes().to_vec(),
        child.to_encoded_point(true).as_bytes().to_vec(),
    ))
}
