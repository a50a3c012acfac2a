//! The compensator: unwinds a saga by publishing compensating events for
//! its completed steps in reverse step-number order.

use common::EventEnvelope;
use outbox::{OutboxEntry, OutboxStore};

use crate::instance::SagaStepRecord;
use crate::registry::CompensationRegistry;
use crate::state::{SagaStatus, StepStatus};
use crate::store::SagaStore;
use crate::{Result, SagaError};
use common::SagaId;

/// Publishes compensating events for a saga's completed steps.
///
/// Compensation goes through the outbox like any other publish, so a crash
/// mid-unwind loses nothing: already-queued compensating events are
/// delivered, and the saga stays COMPENSATING for the next attempt.
pub struct Compensator<S, O> {
    saga_store: S,
    outbox: O,
    registry: CompensationRegistry,
}

impl<S, O> Compensator<S, O>
where
    S: SagaStore,
    O: OutboxStore,
{
    /// Creates a compensator over the given stores and registry.
    pub fn new(saga_store: S, outbox: O, registry: CompensationRegistry) -> Self {
        Self {
            saga_store,
            outbox,
            registry,
        }
    }

    /// Unwinds the saga: walks its COMPLETED steps in reverse step-number
    /// order, queues the registered compensating event for each, and marks
    /// the step COMPENSATED. Steps that never completed have nothing to
    /// undo; steps without a registered compensation are skipped.
    ///
    /// On success the saga ends COMPENSATED.
    #[tracing::instrument(skip(self))]
    pub async fn compensate(&self, saga_id: SagaId) -> Result<()> {
        let saga = self
            .saga_store
            .get(saga_id)
            .await?
            .ok_or(SagaError::NotFound(saga_id))?;

        if !self
            .saga_store
            .update_status(saga_id, SagaStatus::Compensating)
            .await?
        {
            tracing::debug!(%saga_id, status = %saga.status, "saga already terminal, nothing to compensate");
            return Ok(());
        }

        for step in saga.completed_steps_reversed() {
            let Some(mapping) = self.registry.lookup(&step.event_type) else {
                tracing::debug!(
                    %saga_id,
                    step = step.step_number,
                    event_type = %step.event_type,
                    "no compensation registered, skipping step"
                );
                continue;
            };

            let event = EventEnvelope::builder()
                .event_type(&mapping.compensating_event_type)
                .saga_id(saga.saga_id)
                .saga_type(&saga.saga_type)
                .correlation_id(saga.correlation_id)
                .step_number(step.step_number)
                .compensating(true)
                .payload(serde_json::json!({
                    "forward_event_type": step.event_type,
                }))
                .build();

            self.outbox
                .write(OutboxEntry::new(mapping.owning_service.clone(), event))
                .await?;

            self.saga_store
                .upsert_step(
                    saga_id,
                    SagaStepRecord {
                        step_number: step.step_number,
                        event_type: step.event_type.clone(),
                        status: StepStatus::Compensated,
                        completed_at: step.completed_at,
                        failure_reason: step.failure_reason.clone(),
                    },
                )
                .await?;

            metrics::counter!("saga_steps_compensated_total").increment(1);
            tracing::info!(
                %saga_id,
                step = step.step_number,
                forward = %step.event_type,
                compensating = %mapping.compensating_event_type,
                topic = %mapping.owning_service,
                "compensating event queued"
            );
        }

        self.saga_store
            .update_status(saga_id, SagaStatus::Compensated)
            .await?;

        metrics::counter!("saga_compensations_total").increment(1);
        tracing::info!(%saga_id, "saga compensated");
        Ok(())
    }
}
