//! QuickJS-backed sandboxes.
//!
//! Each sandbox owns a dedicated OS thread running its own QuickJS runtime
//! and context, so a plugin that loops forever or exhausts its heap cannot
//! stall the host or another plugin. The host talks to the thread only over
//! the boundary channels; [`SandboxHandle::terminate`] raises the runtime's
//! interrupt flag so even a busy script stops at its next interrupt check.

mod bridge;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keel_core::{JsonRpcRequest, PluginId};
use tracing::{debug, info};

use crate::error::{SandboxError, SandboxResult};
use crate::factory::{
    BoundarySender, ExecutionContextFactory, SandboxHandle, SandboxInstance, boundary_channel,
};
use crate::limits::SandboxLimits;
use crate::protocol::methods;

/// Factory of QuickJS sandboxes.
#[derive(Debug, Clone, Default)]
pub struct QuickJsFactory {
    limits: SandboxLimits,
}

impl QuickJsFactory {
    /// Create a factory applying `limits` to every sandbox.
    #[must_use]
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to new sandboxes.
    #[must_use]
    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }
}

impl ExecutionContextFactory for QuickJsFactory {
    fn create(&self, plugin_id: &PluginId) -> SandboxResult<SandboxInstance> {
        let (to_sandbox, sandbox_inbound) = boundary_channel();
        let (sandbox_outbound, from_sandbox) = boundary_channel();
        let interrupt = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let worker_id = plugin_id.clone();
        let worker_interrupt = Arc::clone(&interrupt);
        let guard = FinishedGuard(Arc::clone(&finished));
        let limits = self.limits;

        // The join handle is dropped; the thread detaches and exits on its own
        // once terminated or disconnected.
        std::thread::Builder::new()
            .name(format!("keel-sandbox:{plugin_id}"))
            .stack_size(limits.worker_stack_size())
            .spawn(move || {
                let _guard = guard;
                worker::run(
                    worker_id,
                    limits,
                    sandbox_inbound,
                    sandbox_outbound,
                    worker_interrupt,
                );
            })
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;

        info!(plugin_id = %plugin_id, "Sandbox created");
        Ok(SandboxInstance {
            sender: to_sandbox.clone(),
            receiver: from_sandbox,
            handle: Box::new(QuickJsHandle {
                plugin_id: plugin_id.clone(),
                sender: to_sandbox,
                interrupt,
                finished,
            }),
        })
    }
}

/// Marks the sandbox finished when the worker thread unwinds or returns.
struct FinishedGuard(Arc<AtomicBool>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Handle of one QuickJS sandbox.
#[derive(Debug)]
pub struct QuickJsHandle {
    plugin_id: PluginId,
    sender: BoundarySender,
    interrupt: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl SandboxHandle for QuickJsHandle {
    fn terminate(&self) {
        if self.interrupt.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(plugin_id = %self.plugin_id, "Terminating sandbox");
        // A closed channel means the worker is already gone.
        let _ = self
            .sender
            .send(JsonRpcRequest::notification(methods::TERMINATE, None).into());
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
