//! Operator endpoints for the dead letter queue.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use bus::MessageBus;
use chrono::{DateTime, Utc};
use common::EventEnvelope;
use dlq::{DeadLetterEntry, DlqEntryId, DlqStore};
use saga::SagaStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// A dead letter entry as returned to operators. The full event payload is
/// included so an entry can be inspected before deciding to replay it.
#[derive(Serialize)]
pub struct DlqEntryResponse {
    pub id: Uuid,
    pub original_event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub event: EventEnvelope,
    pub failure_reason: String,
    pub source_service: String,
    pub saga_id: Option<Uuid>,
    pub replay_count: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_replayed_at: Option<DateTime<Utc>>,
}

impl From<DeadLetterEntry> for DlqEntryResponse {
    fn from(entry: DeadLetterEntry) -> Self {
        Self {
            id: entry.id.as_uuid(),
            original_event_id: entry.original_event_id.as_uuid(),
            event_type: entry.event_type,
            topic: entry.topic,
            event: entry.event,
            failure_reason: entry.failure_reason,
            source_service: entry.source_service,
            saga_id: entry.saga_id.map(|id| id.as_uuid()),
            replay_count: entry.replay_count,
            status: entry.status.to_string(),
            created_at: entry.created_at,
            last_replayed_at: entry.last_replayed_at,
        }
    }
}

#[derive(Serialize)]
pub struct PendingCountResponse {
    pub pending: u64,
}

/// GET /dlq — lists entries, newest first.
pub async fn list<D: DlqStore, B: MessageBus, S: SagaStore>(
    State(state): State<Arc<AppState<D, B, S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DlqEntryResponse>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let entries = state.dlq.list(limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// GET /dlq/count — number of entries awaiting operator attention.
pub async fn pending_count<D: DlqStore, B: MessageBus, S: SagaStore>(
    State(state): State<Arc<AppState<D, B, S>>>,
) -> Result<Json<PendingCountResponse>, ApiError> {
    let pending = state.dlq.pending_count().await?;
    Ok(Json(PendingCountResponse { pending }))
}

/// GET /dlq/{id} — returns a single entry with its full event.
pub async fn get<D: DlqStore, B: MessageBus, S: SagaStore>(
    State(state): State<Arc<AppState<D, B, S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DlqEntryResponse>, ApiError> {
    let id = DlqEntryId::from_uuid(id);
    let entry = state
        .dlq
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dead letter entry {id} not found")))?;
    Ok(Json(entry.into()))
}

/// POST /dlq/{id}/replay — re-publishes the entry to its original topic.
pub async fn replay<D: DlqStore, B: MessageBus, S: SagaStore>(
    State(state): State<Arc<AppState<D, B, S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DlqEntryResponse>, ApiError> {
    let entry = state.dlq.replay(DlqEntryId::from_uuid(id)).await?;
    Ok(Json(entry.into()))
}

/// DELETE /dlq/{id} — discards the entry without republishing.
pub async fn discard<D: DlqStore, B: MessageBus, S: SagaStore>(
    State(state): State<Arc<AppState<D, B, S>>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.dlq.discard(DlqEntryId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
