use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{DeadLetterEntry, DlqEntryId, DlqStatus, DlqStore, Result};

/// In-memory DLQ store for testing.
#[derive(Clone, Default)]
pub struct InMemoryDlqStore {
    entries: Arc<RwLock<HashMap<DlqEntryId, DeadLetterEntry>>>,
}

impl InMemoryDlqStore {
    /// Creates a new empty in-memory DLQ store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries in any status.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl DlqStore for InMemoryDlqStore {
    async fn add(&self, entry: DeadLetterEntry) -> Result<()> {
        self.entries.write().await.insert(entry.id, entry);
        Ok(())
    }

    async fn get(&self, id: DlqEntryId) -> Result<Option<DeadLetterEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let entries = self.entries.read().await;
        let mut all: Vec<DeadLetterEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn pending_count(&self) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.status == DlqStatus::Pending)
            .count() as u64)
    }

    async fn mark_replayed(&self, id: DlqEntryId) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) if entry.status == DlqStatus::Pending => {
                entry.status = DlqStatus::Replayed;
                entry.replay_count += 1;
                entry.last_replayed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_discarded(&self, id: DlqEntryId) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) if entry.status == DlqStatus::Pending => {
                entry.status = DlqStatus::Discarded;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !(e.status.is_terminal() && e.created_at < older_than));
        Ok((before - entries.len()) as u64)
    }
}
