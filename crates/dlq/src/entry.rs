use chrono::{DateTime, Utc};
use common::{CorrelationId, EventEnvelope, EventId, SagaId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a dead letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DlqEntryId(Uuid);

impl DlqEntryId {
    /// Creates a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entry ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DlqEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DlqEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a dead letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DlqStatus {
    /// Captured and awaiting operator attention.
    #[default]
    Pending,

    /// Re-published to its original topic (terminal state).
    Replayed,

    /// Dropped by an operator without republishing (terminal state).
    Discarded,
}

impl DlqStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DlqStatus::Replayed | DlqStatus::Discarded)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DlqStatus::Pending => "PENDING",
            DlqStatus::Replayed => "REPLAYED",
            DlqStatus::Discarded => "DISCARDED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(DlqStatus::Pending),
            "REPLAYED" => Some(DlqStatus::Replayed),
            "DISCARDED" => Some(DlqStatus::Discarded),
            _ => None,
        }
    }
}

impl std::fmt::Display for DlqStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event whose processing failed permanently, captured with enough
/// context to inspect and replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Identifier of this DLQ entry (distinct from the event's own ID).
    pub id: DlqEntryId,

    /// ID of the event that failed processing.
    pub original_event_id: EventId,

    /// Event type, copied out of the envelope for listing.
    pub event_type: String,

    /// The topic the event arrived on; replay re-publishes here.
    pub topic: String,

    /// The full event, sufficient to replay.
    pub event: EventEnvelope,

    /// Why processing failed.
    pub failure_reason: String,

    /// The service whose processing failed.
    pub source_service: String,

    /// Saga the event belonged to, if any.
    pub saga_id: Option<SagaId>,

    /// Correlation back to the originating request, if any.
    pub correlation_id: Option<CorrelationId>,

    /// How many times this entry has been replayed.
    pub replay_count: u32,

    /// Current lifecycle status.
    pub status: DlqStatus,

    /// When the entry was captured.
    pub created_at: DateTime<Utc>,

    /// When the entry was last replayed.
    pub last_replayed_at: Option<DateTime<Utc>>,
}

impl DeadLetterEntry {
    /// Creates a pending entry for a failed event.
    pub fn new(
        topic: impl Into<String>,
        event: EventEnvelope,
        failure_reason: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            id: DlqEntryId::new(),
            original_event_id: event.event_id,
            event_type: event.event_type.clone(),
            topic: topic.into(),
            saga_id: Some(event.saga_id),
            correlation_id: Some(event.correlation_id),
            event,
            failure_reason: failure_reason.into(),
            source_service: source_service.into(),
            replay_count: 0,
            status: DlqStatus::Pending,
            created_at: Utc::now(),
            last_replayed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_copies_event_context() {
        let event = EventEnvelope::builder()
            .event_type("PaymentCharged")
            .step_number(2)
            .build();
        let entry = DeadLetterEntry::new("payments", event.clone(), "declined", "payment-service");

        assert_eq!(entry.original_event_id, event.event_id);
        assert_eq!(entry.event_type, "PaymentCharged");
        assert_eq!(entry.saga_id, Some(event.saga_id));
        assert_eq!(entry.status, DlqStatus::Pending);
        assert_eq!(entry.replay_count, 0);
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [DlqStatus::Pending, DlqStatus::Replayed, DlqStatus::Discarded] {
            assert_eq!(DlqStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DlqStatus::parse("UNKNOWN"), None);
    }
}
