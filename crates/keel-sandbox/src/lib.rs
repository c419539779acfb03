//! Keel Sandbox - Isolated execution contexts for plugins.
//!
//! This crate provides:
//! - The [`ExecutionContextFactory`] seam the execution service creates
//!   sandboxes through
//! - The boundary method names and parameter shapes
//! - [`QuickJsFactory`], a sandbox built on an embedded QuickJS engine with
//!   per-instance memory and stack limits
//!
//! # Architecture
//!
//! A sandbox is a [`SandboxInstance`]: a pair of unbounded channels carrying
//! [`keel_core::BoundaryMessage`]s plus a [`SandboxHandle`] for termination.
//! Inside a QuickJS sandbox the plugin sees `module`, `exports`, `console`,
//! a `snap` object and one global per granted endowment; each endowment's
//! `request(args)` becomes an `endowment.request` call to the host.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;
pub mod protocol;

mod error;
mod factory;
mod limits;
mod quickjs;

pub use error::{SandboxError, SandboxResult};
pub use factory::{
    BoundaryReceiver, BoundarySender, ExecutionContextFactory, SandboxHandle, SandboxInstance,
    boundary_channel,
};
pub use limits::{DEFAULT_MAX_STACK_SIZE_BYTES, DEFAULT_MEMORY_LIMIT_BYTES, SandboxLimits};
pub use quickjs::{QuickJsFactory, QuickJsHandle};
