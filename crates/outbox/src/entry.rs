use chrono::{DateTime, Utc};
use common::{EventEnvelope, EventId};
use serde::{Deserialize, Serialize};

/// Delivery status of an outbox entry.
///
/// Status only advances: `Pending → Delivered` on successful publish, or
/// `Pending → Failed` once retries are exhausted. It never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutboxStatus {
    /// Awaiting delivery to the bus.
    #[default]
    Pending,

    /// Published to the bus (terminal state).
    Delivered,

    /// Retries exhausted; requires manual intervention (terminal state).
    Failed,
}

impl OutboxStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Delivered | OutboxStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Delivered => "DELIVERED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(OutboxStatus::Pending),
            "DELIVERED" => Some(OutboxStatus::Delivered),
            "FAILED" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A buffered outgoing event awaiting delivery to the bus.
///
/// Written by a producer in the same local operation as the state change it
/// announces, then delivered asynchronously by the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Identifier of the buffered event (shared with the envelope).
    pub event_id: EventId,

    /// Target topic on the bus.
    pub topic: String,

    /// The full event to publish.
    pub event: EventEnvelope,

    /// Current delivery status.
    pub status: OutboxStatus,

    /// Delivery attempts that have failed so far.
    pub retry_count: u32,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,

    /// When delivery was last attempted.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Why the last attempt failed, if it did.
    pub failure_reason: Option<String>,
}

impl OutboxEntry {
    /// Creates a pending entry for the given topic and event.
    pub fn new(topic: impl Into<String>, event: EventEnvelope) -> Self {
        Self {
            event_id: event.event_id,
            topic: topic.into(),
            event,
            status: OutboxStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            failure_reason: None,
        }
    }
}
