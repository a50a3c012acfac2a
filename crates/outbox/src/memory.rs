use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use tokio::sync::RwLock;

use crate::{OutboxEntry, OutboxError, OutboxStatus, OutboxStore, Result};

#[derive(Default)]
struct InMemoryOutboxState {
    entries: HashMap<EventId, OutboxEntry>,
    claimed: HashSet<EventId>,
}

/// In-memory outbox store for testing.
///
/// Claims are tracked in a plain set; unlike the PostgreSQL implementation
/// there is no lease expiry, which is fine for a process-local store.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    state: Arc<RwLock<InMemoryOutboxState>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty in-memory outbox store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries in any status.
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn write(&self, entry: OutboxEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.insert(entry.event_id, entry);
        Ok(())
    }

    async fn claim_pending(&self, max: usize) -> Result<Vec<OutboxEntry>> {
        let mut state = self.state.write().await;

        let mut pending: Vec<OutboxEntry> = state
            .entries
            .values()
            .filter(|e| e.status == OutboxStatus::Pending && !state.claimed.contains(&e.event_id))
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(max);

        for entry in &pending {
            state.claimed.insert(entry.event_id);
        }

        Ok(pending)
    }

    async fn mark_delivered(&self, event_id: EventId) -> Result<()> {
        let mut state = self.state.write().await;
        state.claimed.remove(&event_id);

        let entry = state
            .entries
            .get_mut(&event_id)
            .ok_or(OutboxError::NotFound(event_id))?;

        if entry.status == OutboxStatus::Pending {
            entry.status = OutboxStatus::Delivered;
            entry.last_attempt_at = Some(Utc::now());
            entry.failure_reason = None;
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: EventId, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.claimed.remove(&event_id);

        let entry = state
            .entries
            .get_mut(&event_id)
            .ok_or(OutboxError::NotFound(event_id))?;

        if entry.status == OutboxStatus::Pending {
            entry.status = OutboxStatus::Failed;
            entry.last_attempt_at = Some(Utc::now());
            entry.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn increment_retry(&self, event_id: EventId, reason: &str) -> Result<u32> {
        let mut state = self.state.write().await;
        state.claimed.remove(&event_id);

        let entry = state
            .entries
            .get_mut(&event_id)
            .ok_or(OutboxError::NotFound(event_id))?;

        entry.retry_count += 1;
        entry.last_attempt_at = Some(Utc::now());
        entry.failure_reason = Some(reason.to_string());
        Ok(entry.retry_count)
    }

    async fn release(&self, event_id: EventId) -> Result<()> {
        self.state.write().await.claimed.remove(&event_id);
        Ok(())
    }

    async fn get(&self, event_id: EventId) -> Result<Option<OutboxEntry>> {
        Ok(self.state.read().await.entries.get(&event_id).cloned())
    }

    async fn pending_count(&self) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .filter(|e| e.status == OutboxStatus::Pending)
            .count() as u64)
    }

    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, e| !(e.status == OutboxStatus::Delivered && e.created_at < older_than));
        Ok((before - state.entries.len()) as u64)
    }
}
