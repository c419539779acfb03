//! Event types published on the bus.

use std::fmt;

use chrono::{DateTime, Utc};
use keel_core::PluginId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event id.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that published the event.
    pub source: String,
    /// Optional id linking related events (e.g. a request/response pair).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl EventMetadata {
    /// Create metadata for an event published by `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            correlation_id: None,
        }
    }

    /// Link this event to others sharing `correlation_id`.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Enumerated event kind, used for typed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// A plugin started an outbound request through an endowment.
    OutboundRequest,
    /// A plugin's outbound request completed.
    OutboundResponse,
    /// A plugin finished its initial evaluation.
    PluginStarted,
    /// A plugin's execution context was torn down.
    PluginTerminated,
    /// A sandbox died or failed outside of any call.
    UnhandledError,
}

impl EventKind {
    /// The topic string for this kind.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::OutboundRequest => "ExecutionService:outboundRequest",
            Self::OutboundResponse => "ExecutionService:outboundResponse",
            Self::PluginStarted => "ExecutionService:pluginStarted",
            Self::PluginTerminated => "ExecutionService:pluginTerminated",
            Self::UnhandledError => "ExecutionService:unhandledError",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// An event published on the process-wide bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeelEvent {
    /// Outbound request started.
    OutboundRequest {
        /// Event metadata.
        metadata: EventMetadata,
        /// The plugin making the request.
        plugin_id: PluginId,
    },
    /// Outbound request completed (successfully or not).
    OutboundResponse {
        /// Event metadata.
        metadata: EventMetadata,
        /// The plugin that made the request.
        plugin_id: PluginId,
    },
    /// Plugin code evaluated successfully.
    PluginStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// The plugin that started.
        plugin_id: PluginId,
    },
    /// Plugin context terminated.
    PluginTerminated {
        /// Event metadata.
        metadata: EventMetadata,
        /// The plugin that was terminated.
        plugin_id: PluginId,
    },
    /// Sandbox failure outside of a call.
    UnhandledError {
        /// Event metadata.
        metadata: EventMetadata,
        /// The affected plugin.
        plugin_id: PluginId,
        /// Failure description.
        message: String,
    },
}

impl KeelEvent {
    /// The kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::OutboundRequest { .. } => EventKind::OutboundRequest,
            Self::OutboundResponse { .. } => EventKind::OutboundResponse,
            Self::PluginStarted { .. } => EventKind::PluginStarted,
            Self::PluginTerminated { .. } => EventKind::PluginTerminated,
            Self::UnhandledError { .. } => EventKind::UnhandledError,
        }
    }

    /// The topic string of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind().topic()
    }

    /// The event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::OutboundRequest { metadata, .. }
            | Self::OutboundResponse { metadata, .. }
            | Self::PluginStarted { metadata, .. }
            | Self::PluginTerminated { metadata, .. }
            | Self::UnhandledError { metadata, .. } => metadata,
        }
    }

    /// The plugin this event concerns.
    #[must_use]
    pub fn plugin_id(&self) -> &PluginId {
        match self {
            Self::OutboundRequest { plugin_id, .. }
            | Self::OutboundResponse { plugin_id, .. }
            | Self::PluginStarted { plugin_id, .. }
            | Self::PluginTerminated { plugin_id, .. }
            | Self::UnhandledError { plugin_id, .. } => plugin_id,
        }
    }
}
