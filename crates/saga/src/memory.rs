use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use tokio::sync::RwLock;

use crate::instance::{SagaInstance, SagaStepRecord};
use crate::state::SagaStatus;
use crate::store::SagaStore;
use crate::Result;

/// In-memory saga store for testing.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    sagas: Arc<RwLock<HashMap<SagaId, SagaInstance>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory saga store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sagas stored.
    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn create(&self, instance: SagaInstance) -> Result<()> {
        self.sagas
            .write()
            .await
            .entry(instance.saga_id)
            .or_insert(instance);
        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        Ok(self.sagas.read().await.get(&saga_id).cloned())
    }

    async fn upsert_step(&self, saga_id: SagaId, record: SagaStepRecord) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        if let Some(saga) = sagas.get_mut(&saga_id) {
            saga.record_step(record);
        }
        Ok(())
    }

    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<bool> {
        let mut sagas = self.sagas.write().await;
        match sagas.get_mut(&saga_id) {
            Some(saga) if !saga.status.is_terminal() => {
                saga.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SagaInstance>> {
        let sagas = self.sagas.read().await;
        let mut expired: Vec<SagaInstance> = sagas
            .values()
            .filter(|s| {
                (s.status.is_active() || s.status == SagaStatus::Compensating)
                    && s.is_expired(now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|s| s.deadline);
        expired.truncate(limit);
        Ok(expired)
    }
}
