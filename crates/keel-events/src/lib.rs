//! Lifecycle and audit events of the execution engine.
//!
//! The runtime publishes a [`KeelEvent`] when a plugin starts, is terminated
//! or dies unexpectedly, and around every outbound request a plugin makes.
//! Consumers either poll an [`EventReceiver`] (optionally narrowed with an
//! [`EventFilter`]) or register an inline [`EventSubscriber`].
//!
//! The bus is an ordinary value owned by the host application. It is created
//! at startup and handed explicitly to every component that publishes.
//!
//! # Example
//!
//! ```rust
//! use keel_core::PluginId;
//! use keel_events::{EventBus, EventKind, EventMetadata, KeelEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe_kinds([EventKind::OutboundRequest]);
//!
//! bus.publish(KeelEvent::OutboundRequest {
//!     metadata: EventMetadata::new("runtime"),
//!     plugin_id: PluginId::new("npm:example").unwrap(),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.kind(), EventKind::OutboundRequest);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;
mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventKind, EventMetadata, KeelEvent};
pub use subscriber::{
    EventFilter, EventSubscriber, FilterSubscriber, SubscriberId, SubscriberRegistry,
};
