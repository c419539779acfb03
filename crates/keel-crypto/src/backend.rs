//! Pluggable hash primitives used by every derivation scheme.
//!
//! Hosts can route the hashing steps to an alternative implementation (for
//! example a hardware-backed one) by providing their own
//! [`CryptographicFunctions`]. When none is provided, [`DefaultCryptography`]
//! is used.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Hash primitives a derivation backend must provide.
pub trait CryptographicFunctions: Send + Sync {
    /// HMAC-SHA512 of `data` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Backend`] if the backend cannot compute the MAC.
    fn hmac_sha512(&self, key: &[u8], data: &[u8]) -> CryptoResult<Zeroizing<[u8; 64]>>;

    /// PBKDF2-HMAC-SHA512 producing `key_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Backend`] if the backend cannot derive the key.
    fn pbkdf2_sha512(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        key_len: usize,
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;
}

/// Software implementation built on `hmac`, `sha2` and `pbkdf2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCryptography;

impl CryptographicFunctions for DefaultCryptography {
    fn hmac_sha512(&self, key: &[u8], data: &[u8]) -> CryptoResult<Zeroizing<[u8; 64]>> {
        let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        mac.update(data);
        let digest = mac.finalize().into_bytes();

        let mut out = Zeroizing::new([0u8; 64]);
        out.copy_from_slice(&digest);
        Ok(out)
    }

    fn pbkdf2_sha512(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        key_len: usize,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if iterations == 0 {
            return Err(CryptoError::Backend("pbkdf2 needs at least one round".into()));
        }
        let mut out = Zeroizing::new(vec![0u8; key_len]);
        pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
        Ok(out)
    }
}
