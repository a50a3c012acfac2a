//! Saga error types.

use common::SagaId;
use thiserror::Error;

/// Errors that can occur in the saga coordination layer.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No saga exists with the given ID.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A stored status value could not be parsed.
    #[error("Invalid saga status: {0}")]
    InvalidStatus(String),

    /// Outbox error while queueing an event.
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
