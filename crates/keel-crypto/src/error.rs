//! Derivation error types.

use thiserror::Error;

/// Errors that can occur while deriving keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The curve identifier is not one this crate derives on.
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// A derivation path is malformed or not valid for the chosen curve.
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    /// Seed bytes are unusable (wrong length, or the master key is invalid).
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Mnemonic bytes are not a valid BIP-39 phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Child derivation produced an invalid key.
    #[error("derivation failed: {0}")]
    Derivation(String),

    /// The cryptographic backend reported a failure.
    #[error("cryptographic backend error: {0}")]
    Backend(String),
}

/// Result type for derivation operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
