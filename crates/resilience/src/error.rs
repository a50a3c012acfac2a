//! Invoker error types.
//!
//! Wrapped operations fail with an [`OperationError`] carrying an explicit
//! `retryable` tag: transient faults are retried, non-retryable business
//! outcomes (a declined payment, say) are surfaced after zero retries but
//! still count toward the breaker's failure rate.

use thiserror::Error;

/// Error returned by a wrapped operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
    retryable: bool,
}

impl OperationError {
    /// A transient fault worth retrying (network hiccup, 5xx, timeout).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A definitive business outcome that must never be retried.
    pub fn business(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the retry loop may attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure modes surfaced to callers of the invoker.
///
/// Circuit-open rejections are distinguished from exhausted retries so
/// callers can choose to defer rather than dead-letter.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The breaker for this instance is open; the operation was not invoked.
    #[error("Circuit '{name}' is open, call rejected")]
    CircuitOpen { name: String },

    /// All retry attempts failed.
    #[error("Operation '{name}' failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        name: String,
        attempts: u32,
        #[source]
        last: OperationError,
    },

    /// The operation returned a non-retryable business outcome.
    #[error("Operation '{name}' rejected: {source}")]
    Rejected {
        name: String,
        #[source]
        source: OperationError,
    },
}

impl InvokeError {
    /// Returns true if this failure came from an open circuit rather than
    /// from the operation itself.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, InvokeError::CircuitOpen { .. })
    }

    /// Returns the failure message of the underlying operation, if any.
    pub fn operation_message(&self) -> Option<&str> {
        match self {
            InvokeError::CircuitOpen { .. } => None,
            InvokeError::RetriesExhausted { last, .. } => Some(last.message()),
            InvokeError::Rejected { source, .. } => Some(source.message()),
        }
    }
}
