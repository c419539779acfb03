//! Synchronous subscribers notified inline on publish.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use keel_core::PluginId;
use tracing::warn;

use crate::bus::EventBus;
use crate::event::{EventKind, KeelEvent};

/// Handle returned by [`SubscriberRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber:{}", self.0)
    }
}

/// A synchronous event handler.
///
/// `on_event` runs on the publisher's thread, so implementations must be
/// quick and must not block.
pub trait EventSubscriber: Send + Sync {
    /// Called for every published event.
    fn on_event(&self, event: &KeelEvent, bus: &EventBus);
}

/// Predicate over events: by kind, by plugin, or both.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    kinds: Option<HashSet<EventKind>>,
    plugin_id: Option<PluginId>,
}

impl EventFilter {
    /// A filter that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given kinds.
    #[must_use]
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restrict to events about one plugin.
    #[must_use]
    pub fn plugin(mut self, plugin_id: PluginId) -> Self {
        self.plugin_id = Some(plugin_id);
        self
    }

    /// Whether `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &KeelEvent) -> bool {
        if let Some(kinds) = &self.kinds
            && !kinds.contains(&event.kind())
        {
            return false;
        }
        if let Some(plugin_id) = &self.plugin_id
            && event.plugin_id() != plugin_id
        {
            return false;
        }
        true
    }
}

/// Closure-backed subscriber with an optional filter.
pub struct FilterSubscriber {
    name: String,
    filter: EventFilter,
    handler: Box<dyn Fn(&KeelEvent) + Send + Sync>,
}

impl FilterSubscriber {
    /// Create a subscriber that receives every event.
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(&KeelEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            filter: EventFilter::all(),
            handler: Box::new(handler),
        }
    }

    /// Only deliver events matching `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Subscriber name (for diagnostics).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FilterSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSubscriber")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl EventSubscriber for FilterSubscriber {
    fn on_event(&self, event: &KeelEvent, _bus: &EventBus) {
        if self.filter.matches(event) {
            (self.handler)(event);
        }
    }
}

type Entry = (SubscriberId, Arc<dyn EventSubscriber>);

/// Registry of synchronous subscribers, shared by all clones of a bus.
pub struct SubscriberRegistry {
    subscribers: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.subscribers.write() {
            Ok(mut guard) => guard.push((id, subscriber)),
            Err(e) => warn!(error = %e, "Subscriber registry lock poisoned; dropping registration"),
        }
        id
    }

    /// Unregister a subscriber. Returns whether it was present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        // The removed subscriber is dropped after the write lock is released,
        // so its Drop may publish without deadlocking.
        let removed = match self.subscribers.write() {
            Ok(mut guard) => guard
                .iter()
                .position(|(sid, _)| *sid == id)
                .map(|idx| guard.remove(idx)),
            Err(_) => None,
        };
        removed.is_some()
    }

    /// Notify all subscribers of `event`.
    pub(crate) fn notify(&self, event: &KeelEvent, bus: &EventBus) {
        // Snapshot so subscribers may (un)register from inside on_event.
        let snapshot: Vec<Arc<dyn EventSubscriber>> = match self.subscribers.read() {
            Ok(guard) => guard.iter().map(|(_, s)| Arc::clone(s)).collect(),
            Err(_) => return,
        };
        for subscriber in snapshot {
            subscriber.on_event(event, bus);
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("len", &self.len())
            .finish()
    }
}
