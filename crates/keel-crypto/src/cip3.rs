//! BIP32-Ed25519 (Khovratovich-Law) over a CIP-3 "Icarus" master key.
//!
//! Private keys are extended: `kL || kR`, 64 bytes. Public keys are the plain
//! 32-byte compressed Edwards point `A = kL * B`. Unlike SLIP-10, normal
//! (non-hardened) children can be derived from public material alone.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use zeroize::Zeroizing;

use crate::backend::CryptographicFunctions;
use crate::curve::Curve;
use crate::error::{CryptoError, CryptoResult};
use crate::node::{KeyParts, PrivateNode};
use crate::path::ChildIndex;

const PBKDF2_ROUNDS: u32 = 4096;
const MASTER_LEN: usize = 96;

const TAG_HARDENED_KEY: u8 = 0x00;
const TAG_HARDENED_CHAIN: u8 = 0x01;
const TAG_NORMAL_KEY: u8 = 0x02;
const TAG_NORMAL_CHAIN: u8 = 0x03;

/// `kl + 8 * zl` over 256-bit little-endian integers, `zl` being 28 bytes.
#[allow(clippy::arithmetic_side_effects)] // bounded u16 limb arithmetic
fn add_mul8(kl: &[u8], zl: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for (i, byte) in out.iter_mut().enumerate() {
        let k = u16::from(kl.get(i).copied().unwrap_or(0));
        let z = u16::from(if i < 28 { zl.get(i).copied().unwrap_or(0) } else { 0 });
        let sum = k + (z << 3) + carry;
        *byte = sum.to_le_bytes()[0];
        carry = sum >> 8;
    }
    out
}

/// `(a + b) mod 2^256` over little-endian integers.
#[allow(clippy::arithmetic_side_effects)] // bounded u16 limb arithmetic
fn add_mod_2_256(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for (i, byte) in out.iter_mut().enumerate() {
        let sum = u16::from(a.get(i).copied().unwrap_or(0))
            + u16::from(b.get(i).copied().unwrap_or(0))
            + carry;
        *byte = sum.to_le_bytes()[0];
        carry = sum >> 8;
    }
    out
}

fn public_from_kl(kl: &[u8; 32]) -> CryptoResult<[u8; 32]> {
    let scalar = Scalar::from_bytes_mod_order(*kl);
    if scalar == Scalar::ZERO {
        return Err(CryptoError::Derivation("child key is zero".into()));
    }
    Ok(EdwardsPoint::mul_base(&scalar).compress().to_bytes())
}

fn parts(kl: [u8; 32], kr: [u8; 32], chain_code: [u8; 32]) -> CryptoResult<KeyParts> {
    let kl = Zeroizing::new(kl);
    let kr = Zeroizing::new(kr);
    let public_key = public_from_kl(&kl)?.to_vec();

    let mut private_key = Vec::with_capacity(64);
    private_key.extend_from_slice(kl.as_slice());
    private_key.extend_from_slice(kr.as_slice());

    Ok(KeyParts {
        chain_code,
        private_key,
        compressed_public_key: public_key.clone(),
        public_key,
    })
}

/// Master node from BIP-39 entropy.
pub(crate) fn master_from_entropy(
    entropy: &[u8],
    passphrase: &[u8],
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<PrivateNode> {
    let data = backend.pbkdf2_sha512(passphrase, entropy, PBKDF2_ROUNDS, MASTER_LEN)?;
    if data.len() != MASTER_LEN {
        return Err(CryptoError::Backend(format!(
            "pbkdf2 returned {} bytes, expected {MASTER_LEN}",
            data.len()
        )));
    }

    let mut kl = [0u8; 32];
    let mut kr = [0u8; 32];
    let mut chain_code = [0u8; 32];
    kl.copy_from_slice(&data[..32]);
    kr.copy_from_slice(&data[32..64]);
    chain_code.copy_from_slice(&data[64..]);

    kl[0] &= 0b1111_1000;
    kl[31] &= 0b0001_1111;
    kl[31] |= 0b0100_0000;

    Ok(PrivateNode::master(
        Curve::Ed25519Bip32,
        parts(kl, kr, chain_code)?,
    ))
}

fn hmac_pair(
    backend: &dyn CryptographicFunctions,
    chain_code: &[u8; 32],
    key_tag: u8,
    chain_tag: u8,
    body: &[u8],
    index: ChildIndex,
) -> CryptoResult<(Zeroizing<[u8; 64]>, [u8; 32])> {
    let mut data = Zeroizing::new(Vec::with_capacity(body.len().saturating_add(5)));
    data.push(key_tag);
    data.extend_from_slice(body);
    data.extend_from_slice(&index.value().to_le_bytes());
    let z = backend.hmac_sha512(chain_code, &data)?;

    data[0] = chain_tag;
    let c = backend.hmac_sha512(chain_code, &data)?;
    let mut child_chain_code = [0u8; 32];
    child_chain_code.copy_from_slice(&c[32..]);

    Ok((z, child_chain_code))
}

pub(crate) fn child_parts(
    private_key: &[u8],
    public_key: &[u8],
    chain_code: &[u8; 32],
    index: ChildIndex,
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<KeyParts> {
    if private_key.len() != 64 {
        return Err(CryptoError::Derivation(
            "extended private key must be 64 bytes".into(),
        ));
    }
    let (z, child_chain_code) = if index.is_hardened() {
        hmac_pair(
            backend,
            chain_code,
            TAG_HARDENED_KEY,
            TAG_HARDENED_CHAIN,
            private_key,
            index,
        )?
    } else {
        hmac_pair(
            backend,
            chain_code,
            TAG_NORMAL_KEY,
            TAG_NORMAL_CHAIN,
            public_key,
            index,
        )?
    };

    let kl = add_mul8(&private_key[..32], &z[..28]);
    let kr = add_mod_2_256(&private_key[32..], &z[32..]);
    parts(kl, kr, child_chain_code)
}

pub(crate) fn public_child(
    public_key: &[u8],
    chain_code: &[u8; 32],
    index: ChildIndex,
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<([u8; 32], Vec<u8>, Vec<u8>)> {
    let bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::Derivation("public key must be 32 bytes".into()))?;
    let parent = CompressedEdwardsY(bytes)
        .decompress()
        .ok_or_else(|| CryptoError::Derivation("public key is not a curve point".into()))?;

    let (z, child_chain_code) = hmac_pair(
        backend,
        chain_code,
        TAG_NORMAL_KEY,
        TAG_NORMAL_CHAIN,
        public_key,
        index,
    )?;
    let tweak = Scalar::from_bytes_mod_order(add_mul8(&[], &z[..28]));

    #[allow(clippy::arithmetic_side_effects)] // group operation
    let child = parent + EdwardsPoint::mul_base(&tweak);
    let child = child.compress().to_bytes().to_vec();

    Ok((child_chain_code, child.clone(), child))
}
