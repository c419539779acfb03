//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keel_crypto::prelude::*;` to import all essential types.

pub use crate::{CryptoError, CryptoResult};

pub use crate::{ChildIndex, Curve, DerivationPath, HARDENED_OFFSET};

pub use crate::{CryptographicFunctions, DefaultCryptography};

pub use crate::{DerivedNode, PrivateNode, derive_from_mnemonic, derive_from_seed};
