//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keel_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{ExecutionError, ExecutionResult};

// Service
pub use crate::{ExecutionOptions, ExecutionService, HandlerCall};

// Contexts and correlation
pub use crate::{ContextState, ExecutionContext, PendingCalls};

// Endowments
pub use crate::{EndowmentProvider, NoEndowments};
