//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keel_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identity and handlers
pub use crate::{HandlerType, PluginId};

// Boundary protocol
pub use crate::{BoundaryMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
