//! Saga instance and step records.

use chrono::{DateTime, Utc};
use common::{CorrelationId, SagaId};
use serde::{Deserialize, Serialize};

use crate::state::{SagaStatus, StepStatus};

/// One step of a saga, identified by its step number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStepRecord {
    /// Position of the step within the saga.
    pub step_number: u32,

    /// The forward event type that drove this step.
    pub event_type: String,

    /// Current step status.
    pub status: StepStatus,

    /// When the step completed, if it did.
    pub completed_at: Option<DateTime<Utc>>,

    /// Why the step failed, if it did.
    pub failure_reason: Option<String>,
}

impl SagaStepRecord {
    /// Creates a completed step record.
    pub fn completed(step_number: u32, event_type: impl Into<String>) -> Self {
        Self {
            step_number,
            event_type: event_type.into(),
            status: StepStatus::Completed,
            completed_at: Some(Utc::now()),
            failure_reason: None,
        }
    }

    /// Creates a failed step record with the given reason.
    pub fn failed(
        step_number: u32,
        event_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            step_number,
            event_type: event_type.into(),
            status: StepStatus::Failed,
            completed_at: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Durable record of one saga: its identity, steps, and lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    /// Unique saga identifier.
    pub saga_id: SagaId,

    /// The saga type (e.g., "order-fulfillment").
    pub saga_type: String,

    /// Links back to the originating request.
    pub correlation_id: CorrelationId,

    /// Current lifecycle status.
    pub status: SagaStatus,

    /// Step records, ordered by step number.
    pub steps: Vec<SagaStepRecord>,

    /// When the saga started.
    pub started_at: DateTime<Utc>,

    /// Absolute deadline; past this the saga times out.
    pub deadline: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a freshly started saga with the given deadline.
    pub fn new(
        saga_id: SagaId,
        saga_type: impl Into<String>,
        correlation_id: CorrelationId,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id,
            saga_type: saga_type.into(),
            correlation_id,
            status: SagaStatus::Started,
            steps: Vec::new(),
            started_at: Utc::now(),
            deadline,
        }
    }

    /// Records a step, replacing any existing record with the same step
    /// number. Recording the same step twice never duplicates; the latest
    /// write wins. Steps stay ordered by step number.
    pub fn record_step(&mut self, record: SagaStepRecord) {
        match self
            .steps
            .binary_search_by_key(&record.step_number, |s| s.step_number)
        {
            Ok(i) => self.steps[i] = record,
            Err(i) => self.steps.insert(i, record),
        }
    }

    /// Returns the step with the given number, if recorded.
    pub fn step(&self, step_number: u32) -> Option<&SagaStepRecord> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// Returns the completed steps in reverse step-number order, the order
    /// compensation must run in.
    pub fn completed_steps_reversed(&self) -> Vec<&SagaStepRecord> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Completed)
            .collect()
    }

    /// Returns true if the deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }
}
