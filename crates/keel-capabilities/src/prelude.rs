//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keel_capabilities::prelude::*;` to import all essential types.

pub use crate::{CapabilityError, CapabilityResult};

// Grants
pub use crate::{Bip32Entity, CapabilityGrant, Caveat, GrantStore, ValidatedCaveat};

// Targets
pub use crate::{RestrictedTarget, SubjectType};

// Pipeline
pub use crate::{HookError, InvocationOptions, MethodHooks, PermissionPipeline};
