//! DLQ store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{DeadLetterEntry, DlqEntryId, Result};

/// Durable storage for dead letter entries.
#[async_trait]
pub trait DlqStore: Send + Sync {
    /// Persists a new entry.
    async fn add(&self, entry: DeadLetterEntry) -> Result<()>;

    /// Returns an entry by ID.
    async fn get(&self, id: DlqEntryId) -> Result<Option<DeadLetterEntry>>;

    /// Lists up to `limit` entries, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>>;

    /// Number of entries still pending operator attention.
    async fn pending_count(&self) -> Result<u64>;

    /// Atomically flips a PENDING entry to REPLAYED, incrementing its
    /// replay count. Returns false if the entry was not pending (the flip
    /// lost a race or the entry is terminal).
    async fn mark_replayed(&self, id: DlqEntryId) -> Result<bool>;

    /// Atomically flips a PENDING entry to DISCARDED. Returns false if the
    /// entry was not pending.
    async fn mark_discarded(&self, id: DlqEntryId) -> Result<bool>;

    /// Deletes terminal entries created before the cutoff, returning how
    /// many were removed.
    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<u64>;
}
