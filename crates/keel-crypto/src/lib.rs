//! Keel Crypto - Hierarchical deterministic key derivation.
//!
//! This crate provides:
//! - BIP-32 derivation over secp256k1
//! - SLIP-10 derivation over ed25519
//! - BIP32-Ed25519 derivation over a CIP-3 master key
//! - BIP-39 mnemonic to seed / entropy conversion
//! - A pluggable [`CryptographicFunctions`] backend for the hash steps
//!
//! Only [`DerivedNode`] (public key material and metadata) is meant to leave
//! the host. [`PrivateNode`] wipes its key material on drop.
//!
//! # Example
//!
//! ```
//! use keel_crypto::{Curve, DerivationPath, derive_from_seed};
//!
//! let seed = [0x42u8; 64];
//! let path = DerivationPath::parse(&["m", "44'", "60'", "0'"]).unwrap();
//! let node = derive_from_seed(Curve::Secp256k1, &seed, &path, None).unwrap();
//!
//! assert_eq!(node.depth(), 3);
//! assert_eq!(node.compressed_public_key().len(), 33);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod backend;
mod cip3;
mod curve;
mod derive;
mod error;
mod mnemonic;
mod node;
mod path;
mod secp256k1;
mod slip10;

pub use backend::{CryptographicFunctions, DefaultCryptography};
pub use curve::Curve;
pub use derive::{derive_from_mnemonic, derive_from_seed};
pub use error::{CryptoError, CryptoResult};
pub use mnemonic::{mnemonic_to_entropy, mnemonic_to_seed};
pub use node::{DerivedNode, PrivateNode, fingerprint};
pub use path::{ChildIndex, DerivationPath, HARDENED_OFFSET};
