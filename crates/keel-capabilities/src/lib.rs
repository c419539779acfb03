//! Keel Capabilities - Grants, caveats and the restricted-method pipeline.
//!
//! This crate provides:
//! - Raw and validated caveats (`permittedDerivationPaths`)
//! - A static registry of restricted targets with their caveat validators
//! - Capability grants, validated at construction, and an in-memory store
//! - The hook interface the host application implements
//! - The permission pipeline and the key-derivation restricted methods
//!
//! # Security Model
//!
//! A malformed grant never exists: caveats are checked when the grant is
//! built. Every call is then checked against the grant before any secret is
//! requested from the hooks, and only public key material is returned.
//!
//! # Example
//!
//! ```
//! use keel_capabilities::{
//!     Bip32Entity, CapabilityGrant, Caveat, GrantStore, RestrictedTarget,
//! };
//! use keel_core::PluginId;
//!
//! let subject = PluginId::new("npm:example").unwrap();
//! let entity = Bip32Entity::parse(&["m", "44'", "1'"], "secp256k1").unwrap();
//!
//! let grant = CapabilityGrant::for_snap(
//!     subject.clone(),
//!     RestrictedTarget::GetBip32Entropy,
//!     &[Caveat::permitted_derivation_paths(&[entity.clone()])],
//! )
//! .unwrap();
//! assert!(grant.authorize(&entity).is_ok());
//!
//! let store = GrantStore::in_memory();
//! store.grant(grant);
//! assert!(store.has_permission(&subject, RestrictedTarget::GetBip32Entropy));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod methods;
pub mod prelude;

mod caveat;
mod error;
mod grant;
mod hooks;
mod pipeline;
mod store;
mod target;

pub use caveat::{Bip32Entity, Caveat, CaveatType, ValidatedCaveat};
pub use error::{CapabilityError, CapabilityResult};
pub use grant::CapabilityGrant;
pub use hooks::{HookError, MethodHooks};
pub use methods::{DerivationRequest, RestrictedMethod};
pub use pipeline::{InvocationOptions, PermissionPipeline};
pub use store::GrantStore;
pub use target::{CaveatValidator, RestrictedTarget, SubjectType, TargetDescriptor};
