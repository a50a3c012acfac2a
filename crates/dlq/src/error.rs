//! DLQ error types.

use thiserror::Error;

use crate::DlqEntryId;

/// Errors that can occur during dead letter operations.
#[derive(Debug, Error)]
pub enum DlqError {
    /// No entry exists for the given ID.
    #[error("Dead letter entry not found: {0}")]
    NotFound(DlqEntryId),

    /// The entry is not in a replayable state.
    #[error("Dead letter entry {id} cannot be replayed: {reason}")]
    NotReplayable { id: DlqEntryId, reason: String },

    /// The entry has used up its replay budget.
    #[error("Dead letter entry {id} reached the replay limit ({count} attempts)")]
    ReplayLimitReached { id: DlqEntryId, count: u32 },

    /// A stored status value could not be parsed.
    #[error("Invalid dead letter status: {0}")]
    InvalidStatus(String),

    /// Re-publish to the bus failed.
    #[error("Replay publish failed: {0}")]
    Bus(#[from] bus::BusError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for DLQ results.
pub type Result<T> = std::result::Result<T, DlqError>;
