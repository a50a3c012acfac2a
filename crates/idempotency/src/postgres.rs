use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::{IdempotencyStore, Result};

/// PostgreSQL-backed idempotency store.
///
/// The claim is a single `INSERT ... ON CONFLICT` statement, so it is atomic
/// across processes: exactly one node wins each key. Expired rows are
/// reclaimable in the same statement.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Creates a new PostgreSQL idempotency store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + ttl;

        // Insert wins; conflict wins only if the existing row has expired.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (event_id, first_seen, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO UPDATE
                SET first_seen = EXCLUDED.first_seen,
                    expires_at = EXCLUDED.expires_at
                WHERE idempotency_keys.expires_at <= $2
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM idempotency_keys WHERE event_id = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE event_id = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
