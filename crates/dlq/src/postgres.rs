use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, EventEnvelope, EventId, SagaId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{DeadLetterEntry, DlqEntryId, DlqError, DlqStatus, DlqStore, Result};

/// PostgreSQL-backed DLQ store.
///
/// The replay and discard flips are conditional single-statement updates,
/// so two operators racing on the same entry cannot both win.
#[derive(Clone)]
pub struct PostgresDlqStore {
    pool: PgPool,
}

impl PostgresDlqStore {
    /// Creates a new PostgreSQL DLQ store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_entry(row: PgRow) -> Result<DeadLetterEntry> {
        let status_raw: String = row.try_get("status")?;
        let status =
            DlqStatus::parse(&status_raw).ok_or_else(|| DlqError::InvalidStatus(status_raw))?;

        let payload: serde_json::Value = row.try_get("payload")?;
        let event: EventEnvelope = serde_json::from_value(payload)?;

        Ok(DeadLetterEntry {
            id: DlqEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            original_event_id: EventId::from_uuid(row.try_get::<Uuid, _>("original_event_id")?),
            event_type: row.try_get("event_type")?,
            topic: row.try_get("topic")?,
            event,
            failure_reason: row.try_get("failure_reason")?,
            source_service: row.try_get("source_service")?,
            saga_id: row
                .try_get::<Option<Uuid>, _>("saga_id")?
                .map(SagaId::from_uuid),
            correlation_id: row
                .try_get::<Option<Uuid>, _>("correlation_id")?
                .map(CorrelationId::from_uuid),
            replay_count: row.try_get::<i32, _>("replay_count")? as u32,
            status,
            created_at: row.try_get("created_at")?,
            last_replayed_at: row.try_get("last_replayed_at")?,
        })
    }
}

#[async_trait]
impl DlqStore for PostgresDlqStore {
    async fn add(&self, entry: DeadLetterEntry) -> Result<()> {
        let payload = serde_json::to_value(&entry.event)?;

        sqlx::query(
            r#"
            INSERT INTO dead_letters
                (id, original_event_id, event_type, topic, payload, failure_reason,
                 source_service, saga_id, correlation_id, replay_count, status,
                 created_at, last_replayed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.original_event_id.as_uuid())
        .bind(&entry.event_type)
        .bind(&entry.topic)
        .bind(payload)
        .bind(&entry.failure_reason)
        .bind(&entry.source_service)
        .bind(entry.saga_id.map(|id| id.as_uuid()))
        .bind(entry.correlation_id.map(|id| id.as_uuid()))
        .bind(entry.replay_count as i32)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .bind(entry.last_replayed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: DlqEntryId) -> Result<Option<DeadLetterEntry>> {
        let row = sqlx::query("SELECT * FROM dead_letters WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query("SELECT * FROM dead_letters ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters WHERE status = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn mark_replayed(&self, id: DlqEntryId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE dead_letters
            SET status = 'REPLAYED', replay_count = replay_count + 1, last_replayed_at = $2
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_discarded(&self, id: DlqEntryId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE dead_letters SET status = 'DISCARDED' WHERE id = $1 AND status = 'PENDING'")
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM dead_letters WHERE status IN ('REPLAYED', 'DISCARDED') AND created_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
