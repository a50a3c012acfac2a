//! Saga store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;

use crate::instance::{SagaInstance, SagaStepRecord};
use crate::state::SagaStatus;
use crate::Result;

/// Durable record of saga instances and their steps.
///
/// Multiple listener instances mutate the same saga concurrently, so the
/// step upsert must be atomic per `(saga_id, step_number)` and status
/// transitions must never resurrect a terminal saga.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Creates a saga if it does not exist yet. Two listeners racing on the
    /// first event of the same saga both succeed; the first write wins.
    async fn create(&self, instance: SagaInstance) -> Result<()>;

    /// Returns a saga with its steps.
    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>>;

    /// Atomically inserts or replaces the step with the record's step
    /// number. Latest write wins; never duplicates.
    async fn upsert_step(&self, saga_id: SagaId, record: SagaStepRecord) -> Result<()>;

    /// Moves a saga to a new status. Returns false when the saga is already
    /// in a terminal status (terminal sagas never change again).
    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<bool>;

    /// Returns up to `limit` sagas whose deadline has passed and that still
    /// need driving: active ones, plus any left COMPENSATING by an
    /// interrupted unwind. Oldest deadline first.
    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SagaInstance>>;
}
