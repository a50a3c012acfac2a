//! Outbox error types.

use common::EventId;
use thiserror::Error;

/// Errors that can occur during outbox operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// No entry exists for the given event ID.
    #[error("Outbox entry not found: {0}")]
    NotFound(EventId),

    /// A stored status value could not be parsed.
    #[error("Invalid outbox status: {0}")]
    InvalidStatus(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for outbox results.
pub type Result<T> = std::result::Result<T, OutboxError>;
