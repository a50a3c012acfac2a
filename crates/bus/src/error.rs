//! Bus error types.

use thiserror::Error;

/// Errors that can occur when talking to the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus rejected or could not complete a publish.
    #[error("Publish to topic '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// The bus itself cannot be reached; no publish was attempted.
    #[error("Bus unavailable: {reason}")]
    Unavailable { reason: String },

    /// A subscriber's handler returned an error.
    #[error("Handler for topic '{topic}' failed: {reason}")]
    HandlerFailed { topic: String, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Returns true if the bus could not be reached at all, as opposed to
    /// rejecting one particular publish.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BusError::Unavailable { .. })
    }
}

/// Convenience type alias for bus results.
pub type Result<T> = std::result::Result<T, BusError>;
