use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CorrelationId, SagaId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::instance::{SagaInstance, SagaStepRecord};
use crate::state::{SagaStatus, StepStatus};
use crate::store::SagaStore;
use crate::{Result, SagaError};

/// PostgreSQL-backed saga store.
///
/// Instances live in `saga_instances`; steps in `saga_steps` keyed by
/// `(saga_id, step_number)` so the upsert is a single atomic statement.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_instance(row: &PgRow) -> Result<SagaInstance> {
        let status_raw: String = row.try_get("status")?;
        let status =
            SagaStatus::parse(&status_raw).ok_or_else(|| SagaError::InvalidStatus(status_raw))?;

        Ok(SagaInstance {
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            saga_type: row.try_get("saga_type")?,
            correlation_id: CorrelationId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?),
            status,
            steps: Vec::new(),
            started_at: row.try_get("started_at")?,
            deadline: row.try_get("deadline")?,
        })
    }

    fn row_to_step(row: &PgRow) -> Result<SagaStepRecord> {
        let status_raw: String = row.try_get("status")?;
        let status =
            StepStatus::parse(&status_raw).ok_or_else(|| SagaError::InvalidStatus(status_raw))?;

        Ok(SagaStepRecord {
            step_number: row.try_get::<i32, _>("step_number")? as u32,
            event_type: row.try_get("event_type")?,
            status,
            completed_at: row.try_get("completed_at")?,
            failure_reason: row.try_get("failure_reason")?,
        })
    }

    async fn load_steps(&self, saga_id: SagaId) -> Result<Vec<SagaStepRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM saga_steps WHERE saga_id = $1 ORDER BY step_number ASC",
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_step).collect()
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn create(&self, instance: SagaInstance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_instances
                (saga_id, saga_type, correlation_id, status, started_at, deadline)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (saga_id) DO NOTHING
            "#,
        )
        .bind(instance.saga_id.as_uuid())
        .bind(&instance.saga_type)
        .bind(instance.correlation_id.as_uuid())
        .bind(instance.status.as_str())
        .bind(instance.started_at)
        .bind(instance.deadline)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let row = sqlx::query("SELECT * FROM saga_instances WHERE saga_id = $1")
            .bind(saga_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut instance = Self::row_to_instance(&row)?;
        instance.steps = self.load_steps(saga_id).await?;
        Ok(Some(instance))
    }

    async fn upsert_step(&self, saga_id: SagaId, record: SagaStepRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_steps
                (saga_id, step_number, event_type, status, completed_at, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (saga_id, step_number) DO UPDATE
                SET event_type = EXCLUDED.event_type,
                    status = EXCLUDED.status,
                    completed_at = EXCLUDED.completed_at,
                    failure_reason = EXCLUDED.failure_reason
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(record.step_number as i32)
        .bind(&record.event_type)
        .bind(record.status.as_str())
        .bind(record.completed_at)
        .bind(&record.failure_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE saga_instances
            SET status = $2
            WHERE saga_id = $1
              AND status NOT IN ('COMPLETED', 'COMPENSATED', 'FAILED')
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SagaInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM saga_instances
            WHERE status IN ('STARTED', 'IN_PROGRESS', 'COMPENSATING') AND deadline <= $1
            ORDER BY deadline ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut instance = Self::row_to_instance(row)?;
            instance.steps = self.load_steps(instance.saga_id).await?;
            instances.push(instance);
        }
        Ok(instances)
    }
}
