use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventEnvelope, EventId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OutboxEntry, OutboxError, OutboxStatus, OutboxStore, Result};

/// How long a claimed entry stays invisible to other publishers before the
/// lease lapses and it becomes claimable again.
const CLAIM_LEASE: Duration = Duration::from_secs(30);

/// PostgreSQL-backed outbox store.
///
/// `claim_pending` takes a short lease via `FOR UPDATE SKIP LOCKED`, so
/// multiple publisher instances can poll the same table without handing any
/// entry to two of them. A publisher crash simply lets the lease lapse.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_entry(row: PgRow) -> Result<OutboxEntry> {
        let status_raw: String = row.try_get("status")?;
        let status = OutboxStatus::parse(&status_raw)
            .ok_or_else(|| OutboxError::InvalidStatus(status_raw))?;

        let payload: serde_json::Value = row.try_get("payload")?;
        let event: EventEnvelope = serde_json::from_value(payload)?;

        Ok(OutboxEntry {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            topic: row.try_get("topic")?,
            event,
            status,
            retry_count: row.try_get::<i32, _>("retry_count")? as u32,
            created_at: row.try_get("created_at")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            failure_reason: row.try_get("failure_reason")?,
        })
    }

    async fn ensure_exists(&self, event_id: EventId) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        if count == 0 {
            return Err(OutboxError::NotFound(event_id));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn write(&self, entry: OutboxEntry) -> Result<()> {
        let payload = serde_json::to_value(&entry.event)?;

        sqlx::query(
            r#"
            INSERT INTO outbox (event_id, topic, payload, status, retry_count, created_at, last_attempt_at, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.event_id.as_uuid())
        .bind(&entry.topic)
        .bind(payload)
        .bind(entry.status.as_str())
        .bind(entry.retry_count as i32)
        .bind(entry.created_at)
        .bind(entry.last_attempt_at)
        .bind(&entry.failure_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_pending(&self, max: usize) -> Result<Vec<OutboxEntry>> {
        let now = Utc::now();
        let lease_until = now + CLAIM_LEASE;

        let rows = sqlx::query(
            r#"
            UPDATE outbox SET claimed_until = $1
            WHERE event_id IN (
                SELECT event_id FROM outbox
                WHERE status = 'PENDING'
                  AND (claimed_until IS NULL OR claimed_until <= $2)
                ORDER BY created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING event_id, topic, payload, status, retry_count, created_at, last_attempt_at, failure_reason
            "#,
        )
        .bind(lease_until)
        .bind(now)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries: Vec<OutboxEntry> =
            rows.into_iter().map(Self::row_to_entry).collect::<Result<_>>()?;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn mark_delivered(&self, event_id: EventId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'DELIVERED', last_attempt_at = $2, failure_reason = NULL, claimed_until = NULL
            WHERE event_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either missing or already terminal; only the former is an error.
            self.ensure_exists(event_id).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: EventId, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'FAILED', last_attempt_at = $2, failure_reason = $3, claimed_until = NULL
            WHERE event_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(Utc::now())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_exists(event_id).await?;
        }
        Ok(())
    }

    async fn increment_retry(&self, event_id: EventId, reason: &str) -> Result<u32> {
        let retry_count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE outbox
            SET retry_count = retry_count + 1, last_attempt_at = $2, failure_reason = $3, claimed_until = NULL
            WHERE event_id = $1
            RETURNING retry_count
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(Utc::now())
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        retry_count
            .map(|c| c as u32)
            .ok_or(OutboxError::NotFound(event_id))
    }

    async fn release(&self, event_id: EventId) -> Result<()> {
        sqlx::query("UPDATE outbox SET claimed_until = NULL WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, event_id: EventId) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(
            r#"
            SELECT event_id, topic, payload, status, retry_count, created_at, last_attempt_at, failure_reason
            FROM outbox WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = 'PENDING'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM outbox WHERE status = 'DELIVERED' AND created_at < $1")
                .bind(older_than)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
