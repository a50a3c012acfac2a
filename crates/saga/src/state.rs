//! Saga and step state machines.

use serde::{Deserialize, Serialize};

/// The state of a saga instance in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──► InProgress ──┬──► Completed
///    │             │       └──► Compensating ──► Compensated
///    │             │                       └───► Failed
///    └─────────────┴──► TimedOut ──► Compensating ──► …
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// Created on the first forward event; no step completed yet.
    #[default]
    Started,

    /// At least one step completed, more expected.
    InProgress,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensating events are being published for completed steps.
    Compensating,

    /// Every completed step was compensated (terminal state).
    Compensated,

    /// The deadline passed before the saga finished.
    TimedOut,

    /// Compensation itself could not be completed (terminal state).
    Failed,
}

impl SagaStatus {
    /// Returns true if the saga is still making forward progress and is
    /// therefore subject to timeout detection.
    pub fn is_active(&self) -> bool {
        matches!(self, SagaStatus::Started | SagaStatus::InProgress)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InProgress => "IN_PROGRESS",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::TimedOut => "TIMED_OUT",
            SagaStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STARTED" => Some(SagaStatus::Started),
            "IN_PROGRESS" => Some(SagaStatus::InProgress),
            "COMPLETED" => Some(SagaStatus::Completed),
            "COMPENSATING" => Some(SagaStatus::Compensating),
            "COMPENSATED" => Some(SagaStatus::Compensated),
            "TIMED_OUT" => Some(SagaStatus::TimedOut),
            "FAILED" => Some(SagaStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The state of a single step within a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StepStatus {
    /// Recorded but not yet finished.
    #[default]
    Pending,

    /// The step's forward action succeeded.
    Completed,

    /// The step's forward action failed permanently.
    Failed,

    /// A compensating event was published for this step.
    Compensated,
}

impl StepStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(StepStatus::Pending),
            "COMPLETED" => Some(StepStatus::Completed),
            "FAILED" => Some(StepStatus::Failed),
            "COMPENSATED" => Some(StepStatus::Compensated),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(SagaStatus::Started.is_active());
        assert!(SagaStatus::InProgress.is_active());
        assert!(!SagaStatus::Compensating.is_active());
        assert!(!SagaStatus::TimedOut.is_active());
        assert!(!SagaStatus::Completed.is_active());
    }

    #[test]
    fn terminal_states() {
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
        assert!(!SagaStatus::TimedOut.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
    }

    #[test]
    fn saga_status_parse_roundtrip() {
        for status in [
            SagaStatus::Started,
            SagaStatus::InProgress,
            SagaStatus::Completed,
            SagaStatus::Compensating,
            SagaStatus::Compensated,
            SagaStatus::TimedOut,
            SagaStatus::Failed,
        ] {
            assert_eq!(SagaStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SagaStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn step_status_parse_roundtrip() {
        for status in [
            StepStatus::Pending,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Compensated,
        ] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::parse("BOGUS"), None);
    }
}
