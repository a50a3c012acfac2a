//! Idempotency store error types.

use thiserror::Error;

/// Errors that can occur when claiming against the shared store.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store is unavailable.
    #[error("Idempotency store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for idempotency results.
pub type Result<T> = std::result::Result<T, IdempotencyError>;
