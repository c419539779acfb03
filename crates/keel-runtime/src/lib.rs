//! Keel Runtime - The execution service for sandboxed plugins.
//!
//! This crate provides:
//! - [`ExecutionService`]: create, call into and tear down one execution
//!   context per plugin
//! - [`PendingCalls`]: the correlation table matching sandbox responses to
//!   in-flight calls
//! - [`EndowmentProvider`]: the seam through which granted endowments reach
//!   host resources
//! - [`config_bridge`]: conversion from `keel_config::Config` into runtime,
//!   sandbox, event and logging types
//!
//! # Architecture
//!
//! Every context owns a sandbox created through a
//! [`keel_sandbox::ExecutionContextFactory`] and a pump task draining the
//! sandbox's outbound channel. Host calls register in the context's
//! correlation table, go out as JSON-RPC requests and complete when the pump
//! routes the matching response back, the call times out, or the context is
//! torn down. Requests the plugin makes are served on tasks bound to the
//! context's cancellation token: `snap.request` calls go through the
//! [`keel_capabilities::PermissionPipeline`], everything else through the
//! [`EndowmentProvider`] bracketed by `outboundRequest` / `outboundResponse`
//! events.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_runtime::prelude::*;
//!
//! let service = ExecutionService::new(factory, bus, ExecutionOptions::default());
//! service.execute_snap(&id, source, &[]).await?;
//! let result = service
//!     .handle_rpc_request(&id, HandlerCall::rpc("https://example.com", request))
//!     .await?;
//! service.terminate_snap(&id);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config_bridge;
pub mod prelude;

mod context;
mod correlation;
mod endowment;
mod error;
mod options;
mod pump;
mod service;

pub use context::{ContextState, ExecutionContext};
pub use correlation::{CallOutcome, PendingCall, PendingCalls, request_id};
pub use endowment::{EndowmentProvider, NoEndowments};
pub use error::{ExecutionError, ExecutionResult};
pub use options::{DEFAULT_CALL_TIMEOUT, DEFAULT_INIT_TIMEOUT, ExecutionOptions};
pub use service::{ExecutionService, HOST_ORIGIN, HandlerCall};
