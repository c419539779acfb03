//! Keel Test - Shared test utilities for the Keel plugin engine.
//!
//! This crate provides mock implementations and fixtures that can be used
//! across multiple Keel crates as a dev-dependency:
//!
//! - [`MockHooks`]: scripted secret and unlock hooks for the permission
//!   pipeline
//! - [`ScriptedFactory`]: an execution context factory whose sandboxes answer
//!   from a closure instead of running a script engine
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! keel-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use keel_test::prelude::*;
//!
//! let factory = Arc::new(ScriptedFactory::new());
//! let service = ExecutionService::new(factory.clone(), bus, options);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
