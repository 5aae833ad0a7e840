//! In-process event bus.
//!
//! Broadcast-based pub-sub with sequence numbering. The HTTP/WS front ends
//! subscribe here to stream board updates; publishing never blocks and is
//! fire-and-forget when no subscriber is attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

/// Event payload carried to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// `mission:updated`
    MissionUpdated {
        mission_id: String,
        status: String,
    },
    /// `agent:created`
    AgentCreated {
        agent_id: String,
        name: String,
        agent_type: String,
    },
    /// `agent:updated`
    AgentUpdated {
        agent_id: String,
        status: String,
    },
    /// `chat:message`
    ChatMessage {
        mission_id: String,
        message_id: String,
        role: String,
        sender: String,
    },
    /// `merge:completed`
    MergeCompleted {
        mission_id: String,
        branch: String,
    },
}

impl EventPayload {
    /// Topic string of this payload as the front ends know it.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::MissionUpdated { .. } => "mission:updated",
            Self::AgentCreated { .. } => "agent:created",
            Self::AgentUpdated { .. } => "agent:updated",
            Self::ChatMessage { .. } => "chat:message",
            Self::MergeCompleted { .. } => "merge:completed",
        }
    }
}

/// Event envelope with bus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Broadcast channel capacity
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self { sender, sequence: AtomicU64::new(0) }
    }

    /// Publish one payload. Send errors (no subscribers) are ignored.
    pub fn publish(&self, payload: EventPayload) {
        let event = BusEvent {
            id: EventId::new(),
            sequence: SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst)),
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
