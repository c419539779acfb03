//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keel_sandbox::prelude::*;` to import all essential types.

pub use crate::{SandboxError, SandboxResult};

// Factory seam
pub use crate::{ExecutionContextFactory, SandboxHandle, SandboxInstance, SandboxLimits};

// QuickJS
pub use crate::QuickJsFactory;
