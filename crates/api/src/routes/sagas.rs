//! Read-only saga inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use bus::MessageBus;
use chrono::{DateTime, Utc};
use common::SagaId;
use dlq::DlqStore;
use saga::{SagaInstance, SagaStepRecord, SagaStore};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct SagaStepResponse {
    pub step_number: u32,
    pub event_type: String,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl From<&SagaStepRecord> for SagaStepResponse {
    fn from(step: &SagaStepRecord) -> Self {
        Self {
            step_number: step.step_number,
            event_type: step.event_type.clone(),
            status: step.status.to_string(),
            completed_at: step.completed_at,
            failure_reason: step.failure_reason.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct SagaResponse {
    pub saga_id: Uuid,
    pub saga_type: String,
    pub correlation_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub steps: Vec<SagaStepResponse>,
}

impl From<SagaInstance> for SagaResponse {
    fn from(saga: SagaInstance) -> Self {
        Self {
            saga_id: saga.saga_id.as_uuid(),
            saga_type: saga.saga_type.clone(),
            correlation_id: saga.correlation_id.as_uuid(),
            status: saga.status.to_string(),
            started_at: saga.started_at,
            deadline: saga.deadline,
            steps: saga.steps.iter().map(Into::into).collect(),
        }
    }
}

/// GET /sagas/{id} — returns a saga with its recorded steps.
pub async fn get<D: DlqStore, B: MessageBus, S: SagaStore>(
    State(state): State<Arc<AppState<D, B, S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id = SagaId::from_uuid(id);
    let saga = state
        .saga_store
        .get(saga_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("saga {saga_id} not found")))?;
    Ok(Json(saga.into()))
}
