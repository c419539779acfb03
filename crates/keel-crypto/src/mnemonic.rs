//! BIP-39 mnemonic handling.

use bip39::Mnemonic;
use zeroize::Zeroizing;

use crate::backend::CryptographicFunctions;
use crate::error::{CryptoError, CryptoResult};

const SEED_ROUNDS: u32 = 2048;
const SEED_LEN: usize = 64;

fn parse(phrase: &[u8]) -> CryptoResult<Mnemonic> {
    let phrase = std::str::from_utf8(phrase)
        .map_err(|_| CryptoError::InvalidMnemonic("phrase is not valid UTF-8".into()))?;
    Mnemonic::parse_normalized(phrase.trim())
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))
}

/// BIP-39 seed of a UTF-8 encoded phrase.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidMnemonic`] if the phrase does not parse, or
/// a backend error from the PBKDF2 step.
pub fn mnemonic_to_seed(
    phrase: &[u8],
    passphrase: &str,
    backend: &dyn CryptographicFunctions,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mnemonic = parse(phrase)?;
    let normalized = Zeroizing::new(mnemonic.to_string());
    let salt = Zeroizing::new(format!("mnemonic{passphrase}"));
    backend.pbkdf2_sha512(normalized.as_bytes(), salt.as_bytes(), SEED_ROUNDS, SEED_LEN)
}

/// Entropy encoded by a UTF-8 encoded phrase.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidMnemonic`] if the phrase does not parse.
pub fn mnemonic_to_entropy(phrase: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    Ok(Zeroizing::new(parse(phrase)?.to_entropy()))
}
