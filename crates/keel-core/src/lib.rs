//! Keel Core - Foundation types for the Keel plugin execution engine.
//!
//! This crate provides:
//! - [`PluginId`], the opaque identity that keys all per-plugin state
//! - [`HandlerType`], the named entry points a plugin may export
//! - The JSON-RPC 2.0 message types exchanged across the sandbox boundary
//!
//! # Example
//!
//! ```
//! use keel_core::{JsonRpcRequest, PluginId, RequestId};
//!
//! let id = PluginId::new("npm:@keel/example").unwrap();
//! let request = JsonRpcRequest::new(RequestId::Number(1), "ping", None);
//!
//! assert_eq!(id.as_str(), "npm:@keel/example");
//! assert_eq!(request.method, "ping");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod rpc;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use rpc::{BoundaryMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, error_codes};
pub use types::{HandlerType, PluginId};
