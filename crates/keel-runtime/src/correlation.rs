//! RPC correlation: matching sandbox responses to in-flight calls.
//!
//! Every call into a sandbox gets a correlation id that is unique for the
//! lifetime of its context. The id maps to a [`PendingCall`] holding the
//! responder of the waiting caller. Each entry is removed exactly once: on
//! response, on timeout, or on cancellation, whichever comes first.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use keel_core::{JsonRpcError, JsonRpcResponse, RequestId};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How a pending call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The sandbox answered.
    Response(Result<Value, JsonRpcError>),
    /// The context went away first.
    Cancelled,
}

/// An in-flight call into a sandbox.
#[derive(Debug)]
pub struct PendingCall {
    /// Who asked.
    pub origin: String,
    /// Boundary method of the call.
    pub method: String,
    /// Params sent with the call.
    pub params: Option<Value>,
    /// When the call was registered.
    pub created_at: DateTime<Utc>,
    responder: oneshot::Sender<CallOutcome>,
}

/// Correlation table of one execution context.
#[derive(Debug)]
pub struct PendingCalls {
    next_id: AtomicU64,
    calls: DashMap<u64, PendingCall>,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    /// Create an empty table. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            calls: DashMap::new(),
        }
    }

    /// Register a call and return its id with the receiver of its outcome.
    pub fn register(
        &self,
        origin: impl Into<String>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> (u64, oneshot::Receiver<CallOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (responder, receiver) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                origin: origin.into(),
                method: method.into(),
                params,
                created_at: Utc::now(),
                responder,
            },
        );
        (id, receiver)
    }

    /// Resolve the call `response` answers.
    ///
    /// Responses with an unknown or non-numeric id are dropped with a warning.
    /// Returns whether a call was resolved.
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id.as_u64() else {
            warn!(id = %response.id, "Dropping response with non-numeric correlation id");
            return false;
        };
        let Some((_, call)) = self.calls.remove(&id) else {
            warn!(id, "Dropping response with unknown correlation id");
            return false;
        };
        debug!(id, method = %call.method, "Resolved pending call");
        // The caller may have stopped waiting; nothing to do then.
        let _ = call
            .responder
            .send(CallOutcome::Response(response.into_result()));
        true
    }

    /// Reject every pending call with [`CallOutcome::Cancelled`]. Returns how
    /// many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<u64> = self.calls.iter().map(|entry| *entry.key()).collect();
        let mut cancelled: usize = 0;
        for id in ids {
            if let Some((_, call)) = self.calls.remove(&id) {
                let _ = call.responder.send(CallOutcome::Cancelled);
                cancelled = cancelled.saturating_add(1);
            }
        }
        cancelled
    }

    /// Forget a call without resolving it (used on timeout).
    pub fn remove(&self, id: u64) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Whether `id` is pending.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.calls.contains_key(&id)
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no call is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Removes its call from the table when dropped, so a caller that stops
/// waiting leaves nothing behind.
#[derive(Debug)]
pub(crate) struct PendingGuard<'a> {
    calls: &'a PendingCalls,
    id: u64,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(calls: &'a PendingCalls, id: u64) -> Self {
        Self { calls, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.calls.remove(self.id) {
            debug!(id = self.id, "Abandoned pending call removed");
        }
    }
}

/// The wire id of a correlation id.
#[must_use]
pub fn request_id(id: u64) -> RequestId {
    RequestId::Number(id)
}
