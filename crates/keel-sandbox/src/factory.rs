//! The Execution Context Factory seam.
//!
//! A factory turns a plugin identity into a running sandbox wired to a pair
//! of boundary channels. The execution service only ever talks to a sandbox
//! through these channels and the [`SandboxHandle`].

use std::fmt;

use keel_core::{BoundaryMessage, PluginId};
use tokio::sync::mpsc;

use crate::error::SandboxResult;

/// Sending half of a boundary channel.
pub type BoundarySender = mpsc::UnboundedSender<BoundaryMessage>;

/// Receiving half of a boundary channel.
pub type BoundaryReceiver = mpsc::UnboundedReceiver<BoundaryMessage>;

/// Create an unbounded boundary channel.
#[must_use]
pub fn boundary_channel() -> (BoundarySender, BoundaryReceiver) {
    mpsc::unbounded_channel()
}

/// Control surface of a running sandbox.
pub trait SandboxHandle: Send + Sync + fmt::Debug {
    /// Stop the sandbox, interrupting any script that is still running.
    /// Never fails and never blocks; calling it twice is harmless.
    fn terminate(&self);

    /// Whether the sandbox has fully stopped.
    fn is_finished(&self) -> bool;
}

/// A freshly created sandbox.
#[derive(Debug)]
pub struct SandboxInstance {
    /// Messages into the sandbox.
    pub sender: BoundarySender,
    /// Messages out of the sandbox. Closes when the sandbox stops.
    pub receiver: BoundaryReceiver,
    /// Lifecycle control.
    pub handle: Box<dyn SandboxHandle>,
}

/// Creates one isolated sandbox per plugin.
pub trait ExecutionContextFactory: Send + Sync {
    /// Create a sandbox for `plugin_id`. Source is shipped afterwards with an
    /// `executeSnap` request.
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox could not be started.
    fn create(&self, plugin_id: &PluginId) -> SandboxResult<SandboxInstance>;
}
