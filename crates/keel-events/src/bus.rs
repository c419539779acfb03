//! Broadcast bus carrying lifecycle and audit events.

use std::sync::Arc;

use keel_core::PluginId;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::event::{EventKind, KeelEvent};
use crate::subscriber::{EventFilter, SubscriberRegistry};

/// Capacity used by [`EventBus::new`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Process-wide event fan-out, owned by the host application.
///
/// Events reach async receivers through a broadcast channel, in publish
/// order. Inline subscribers in the [`SubscriberRegistry`] run on the
/// publisher's thread before [`EventBus::publish`] returns. Clones share both.
///
/// An inline subscriber must not hold a clone of the bus it is registered
/// on: the registry would keep itself alive.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<KeelEvent>>,
    registry: Arc<SubscriberRegistry>,
    capacity: usize,
}

impl EventBus {
    /// Bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus buffering up to `capacity` events per slow receiver (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registry: Arc::new(SubscriberRegistry::new()),
            capacity,
        }
    }

    /// Publish `event`. Returns how many async receivers it was queued for.
    pub fn publish(&self, event: KeelEvent) -> usize {
        let event = Arc::new(event);
        let delivered = self.sender.send(Arc::clone(&event)).unwrap_or(0);
        trace!(
            event_type = event.event_type(),
            plugin_id = %event.plugin_id(),
            receivers = delivered,
            "Event published"
        );
        self.registry.notify(&event, self);
        delivered
    }

    /// Receive every event.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.subscribe_filtered(EventFilter::all())
    }

    /// Receive events of `kinds` only.
    #[must_use]
    pub fn subscribe_kinds(&self, kinds: impl IntoIterator<Item = EventKind>) -> EventReceiver {
        self.subscribe_filtered(EventFilter::all().kinds(kinds))
    }

    /// Receive events about one plugin only.
    #[must_use]
    pub fn subscribe_plugin(&self, plugin_id: PluginId) -> EventReceiver {
        self.subscribe_filtered(EventFilter::all().plugin(plugin_id))
    }

    /// Receive events passing `filter`.
    #[must_use]
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Inline subscribers.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Async receivers plus inline subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .receiver_count()
            .saturating_add(self.registry.len())
    }

    /// Per-receiver buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Async end of an [`EventBus`] subscription.
#[derive(Debug)]
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<KeelEvent>>,
    filter: EventFilter,
}

impl EventReceiver {
    /// Next event passing this receiver's filter, or `None` once every bus
    /// clone is dropped.
    ///
    /// Falling more than the bus capacity behind drops the oldest events;
    /// the gap is logged and reception continues.
    pub async fn recv(&mut self) -> Option<Arc<KeelEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event receiver fell behind");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`EventReceiver::recv`], without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<KeelEvent>> {
        use broadcast::error::TryRecvError;
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {},
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Event receiver fell behind");
                },
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::EventMetadata;
    use crate::subscriber::FilterSubscriber;

    fn plugin(id: &str) -> PluginId {
        PluginId::new(id).unwrap()
    }

    fn started(id: &str) -> KeelEvent {
        KeelEvent::PluginStarted {
            metadata: EventMetadata::new("test"),
            plugin_id: plugin(id),
        }
    }

    fn outbound(id: &str) -> KeelEvent {
        KeelEvent::OutboundRequest {
            metadata: EventMetadata::new("test"),
            plugin_id: plugin(id),
        }
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(EventBus::new().capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(EventBus::with_capacity(8).capacity(), 8);
        assert_eq!(EventBus::with_capacity(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_receiver() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(started("npm:a")), 0);

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.publish(started("npm:a")), 2);

        for receiver in [&mut first, &mut second] {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.event_type(), "ExecutionService:pluginStarted");
        }
    }

    #[test]
    fn test_publish_order_is_kept() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        bus.publish(outbound("npm:a"));
        bus.publish(started("npm:a"));

        assert_eq!(receiver.try_recv().unwrap().kind(), EventKind::OutboundRequest);
        assert_eq!(receiver.try_recv().unwrap().kind(), EventKind::PluginStarted);
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_kind_and_plugin_filters() {
        let bus = EventBus::new();
        let mut outbound_only = bus.subscribe_kinds([EventKind::OutboundRequest]);
        let mut only_b = bus.subscribe_plugin(plugin("npm:b"));

        bus.publish(started("npm:a"));
        bus.publish(outbound("npm:a"));
        bus.publish(started("npm:b"));

        assert_eq!(outbound_only.try_recv().unwrap().plugin_id(), &plugin("npm:a"));
        assert!(outbound_only.try_recv().is_none());

        let event = only_b.try_recv().unwrap();
        assert_eq!(event.kind(), EventKind::PluginStarted);
        assert_eq!(event.plugin_id(), &plugin("npm:b"));
        assert!(only_b.try_recv().is_none());
    }

    #[test]
    fn test_lagging_receiver_keeps_newest() {
        let bus = EventBus::with_capacity(2);
        let mut receiver = bus.subscribe();
        for id in ["npm:a", "npm:b", "npm:c"] {
            bus.publish(started(id));
        }

        assert_eq!(receiver.try_recv().unwrap().plugin_id(), &plugin("npm:b"));
        assert_eq!(receiver.try_recv().unwrap().plugin_id(), &plugin("npm:c"));
    }

    #[tokio::test]
    async fn test_recv_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        drop(bus);
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_clones_share_inline_subscribers() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.clone().registry().register(Arc::new(FilterSubscriber::new(
            "count",
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )));

        bus.publish(started("npm:a"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
