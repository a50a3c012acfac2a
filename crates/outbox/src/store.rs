//! Outbox store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;

use crate::{OutboxEntry, Result};

/// Durable buffer for outgoing events.
///
/// Multiple publisher instances may poll the same store concurrently, so
/// `claim_pending` must hand each pending entry to at most one caller at a
/// time. Claims are released by `mark_delivered`, `mark_failed`,
/// `increment_retry`, or `release`.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Writes a new pending entry.
    async fn write(&self, entry: OutboxEntry) -> Result<()>;

    /// Claims up to `max` pending entries, oldest first.
    async fn claim_pending(&self, max: usize) -> Result<Vec<OutboxEntry>>;

    /// Marks an entry delivered. No-op unless the entry is pending: status
    /// never regresses.
    async fn mark_delivered(&self, event_id: EventId) -> Result<()>;

    /// Marks an entry permanently failed with the given reason.
    async fn mark_failed(&self, event_id: EventId, reason: &str) -> Result<()>;

    /// Records a failed attempt and releases the claim. Returns the new
    /// retry count.
    async fn increment_retry(&self, event_id: EventId, reason: &str) -> Result<u32>;

    /// Releases a claim without recording an attempt (used when the bus was
    /// unreachable and the attempt never happened).
    async fn release(&self, event_id: EventId) -> Result<()>;

    /// Returns a single entry by event ID.
    async fn get(&self, event_id: EventId) -> Result<Option<OutboxEntry>>;

    /// Number of entries still pending delivery.
    async fn pending_count(&self) -> Result<u64>;

    /// Deletes delivered entries created before the cutoff, returning how
    /// many were removed.
    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> Result<u64>;
}
