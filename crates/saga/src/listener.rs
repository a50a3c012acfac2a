//! The saga listener: the inbound path for one service's saga events.
//!
//! Each delivered event runs through the idempotency guard, then the
//! business action wrapped by the resilient invoker. Success records the
//! step and queues the next forward event through the outbox; exhausted
//! resilience captures the event in the DLQ; an open circuit defers the
//! event for redelivery instead of dead-lettering it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus::{BusError, EventHandler, MessageBus};
use chrono::Utc;
use common::EventEnvelope;
use dlq::{DeadLetterEntry, DeadLetterService, DlqStore};
use idempotency::IdempotencyGuard;
use outbox::{OutboxEntry, OutboxStore};
use resilience::{OperationError, ResilientInvoker};

use crate::instance::{SagaInstance, SagaStepRecord};
use crate::state::SagaStatus;
use crate::store::SagaStore;
use crate::Result;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Name of the service this listener runs in; recorded on DLQ entries.
    pub service_name: String,
    /// Deadline horizon for sagas created by this listener's first event.
    pub saga_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            saga_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// What the business action produced for a successfully processed event.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Step done; queue the next forward event on the given topic.
    Continue {
        topic: String,
        event_type: String,
        payload: serde_json::Value,
    },

    /// Step done and the saga is finished.
    SagaCompleted,
}

/// The business operation a service runs when a saga event arrives.
///
/// `name` selects the resilience instance, one per saga step, so a failing
/// step cannot trip another step's breaker.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Resilience instance name for this action.
    fn name(&self) -> &str;

    /// Runs the business operation for one event.
    async fn run(&self, event: &EventEnvelope)
    -> std::result::Result<StepOutcome, OperationError>;
}

/// How the listener settled one delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The step ran and the saga advanced.
    Processed,

    /// Another claim already won this event id; nothing was done.
    DuplicateSkipped,

    /// The circuit for this step is open; the event was left for
    /// redelivery and its idempotency claim released.
    Deferred,

    /// Resilience exhausted; the event was captured in the DLQ.
    DeadLettered,
}

/// Consumes saga events for one step of one service.
pub struct SagaListener<S, O, D, B> {
    saga_store: S,
    outbox: O,
    dlq: Arc<DeadLetterService<D, B>>,
    guard: IdempotencyGuard,
    invoker: ResilientInvoker,
    action: Arc<dyn StepAction>,
    config: ListenerConfig,
}

impl<S, O, D, B> SagaListener<S, O, D, B>
where
    S: SagaStore,
    O: OutboxStore,
    D: DlqStore,
    B: MessageBus,
{
    /// Creates a listener for one step action.
    pub fn new(
        saga_store: S,
        outbox: O,
        dlq: Arc<DeadLetterService<D, B>>,
        guard: IdempotencyGuard,
        invoker: ResilientInvoker,
        action: Arc<dyn StepAction>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            saga_store,
            outbox,
            dlq,
            guard,
            invoker,
            action,
            config,
        }
    }

    /// Processes one delivered event.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, saga_id = %event.saga_id))]
    pub async fn process(&self, topic: &str, event: &EventEnvelope) -> Result<ProcessOutcome> {
        if !self.guard.try_process(event.event_id).await {
            return Ok(ProcessOutcome::DuplicateSkipped);
        }

        self.ensure_saga(event).await?;

        match self
            .invoker
            .execute(self.action.name(), || self.action.run(event))
            .await
        {
            Ok(outcome) => {
                self.complete_step(event, outcome).await?;
                metrics::counter!("saga_steps_completed_total").increment(1);
                Ok(ProcessOutcome::Processed)
            }
            Err(e) if e.is_circuit_open() => {
                // The operation never ran. Give the claim back so the
                // redelivered event can be processed once the circuit closes.
                self.guard.release(event.event_id).await;
                metrics::counter!("saga_steps_deferred_total").increment(1);
                tracing::warn!(step = %self.action.name(), "circuit open, event deferred for redelivery");
                Ok(ProcessOutcome::Deferred)
            }
            Err(e) => {
                let reason = e.to_string();
                self.saga_store
                    .upsert_step(
                        event.saga_id,
                        SagaStepRecord::failed(event.step_number, &event.event_type, &reason),
                    )
                    .await?;

                self.dlq
                    .capture(DeadLetterEntry::new(
                        topic,
                        event.clone(),
                        reason,
                        self.config.service_name.clone(),
                    ))
                    .await;

                metrics::counter!("saga_steps_failed_total").increment(1);
                Ok(ProcessOutcome::DeadLettered)
            }
        }
    }

    /// Creates the saga on the first event seen for it.
    async fn ensure_saga(&self, event: &EventEnvelope) -> Result<()> {
        if self.saga_store.get(event.saga_id).await?.is_some() {
            return Ok(());
        }

        let deadline = Utc::now()
            + chrono::Duration::from_std(self.config.saga_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(5));
        self.saga_store
            .create(SagaInstance::new(
                event.saga_id,
                event.saga_type.clone(),
                event.correlation_id,
                deadline,
            ))
            .await?;

        tracing::info!(saga_type = %event.saga_type, deadline = %deadline, "saga started");
        Ok(())
    }

    async fn complete_step(&self, event: &EventEnvelope, outcome: StepOutcome) -> Result<()> {
        self.saga_store
            .upsert_step(
                event.saga_id,
                SagaStepRecord::completed(event.step_number, &event.event_type),
            )
            .await?;

        match outcome {
            StepOutcome::Continue {
                topic,
                event_type,
                payload,
            } => {
                self.saga_store
                    .update_status(event.saga_id, SagaStatus::InProgress)
                    .await?;

                let next = EventEnvelope::builder()
                    .event_type(event_type)
                    .saga_id(event.saga_id)
                    .saga_type(&event.saga_type)
                    .correlation_id(event.correlation_id)
                    .step_number(event.step_number + 1)
                    .payload(payload)
                    .build();
                self.outbox.write(OutboxEntry::new(topic, next)).await?;
            }
            StepOutcome::SagaCompleted => {
                self.saga_store
                    .update_status(event.saga_id, SagaStatus::Completed)
                    .await?;
                tracing::info!(saga_id = %event.saga_id, "saga completed");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<S, O, D, B> EventHandler for SagaListener<S, O, D, B>
where
    S: SagaStore,
    O: OutboxStore,
    D: DlqStore,
    B: MessageBus,
{
    async fn handle(&self, topic: &str, event: EventEnvelope) -> bus::Result<()> {
        self.process(topic, &event)
            .await
            .map(|_| ())
            .map_err(|e| BusError::HandlerFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySagaStore;
    use crate::state::StepStatus;
    use bus::InMemoryBus;
    use dlq::{DlqConfig, InMemoryDlqStore};
    use idempotency::{IdempotencyConfig, InMemoryIdempotencyStore};
    use outbox::InMemoryOutboxStore;
    use resilience::{ResilienceConfig, ResilienceSettings};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone)]
    enum Mode {
        Advance,
        Complete,
        FailBusiness,
        FailTransient,
    }

    struct TestAction {
        mode: Mutex<Mode>,
        calls: AtomicU32,
    }

    impl TestAction {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode: Mutex::new(mode),
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StepAction for TestAction {
        fn name(&self) -> &str {
            "charge-payment"
        }

        async fn run(
            &self,
            _event: &EventEnvelope,
        ) -> std::result::Result<StepOutcome, OperationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode.lock().unwrap().clone() {
                Mode::Advance => Ok(StepOutcome::Continue {
                    topic: "shipping".to_string(),
                    event_type: "PaymentCharged".to_string(),
                    payload: serde_json::json!({"amount_cents": 4500}),
                }),
                Mode::Complete => Ok(StepOutcome::SagaCompleted),
                Mode::FailBusiness => Err(OperationError::business("payment declined")),
                Mode::FailTransient => Err(OperationError::transient("gateway timeout")),
            }
        }
    }

    struct Fixture {
        listener: SagaListener<InMemorySagaStore, InMemoryOutboxStore, InMemoryDlqStore, InMemoryBus>,
        action: Arc<TestAction>,
        saga_store: InMemorySagaStore,
        outbox: InMemoryOutboxStore,
        dlq_store: InMemoryDlqStore,
    }

    fn fixture(mode: Mode, resilience: ResilienceConfig) -> Fixture {
        let saga_store = InMemorySagaStore::new();
        let outbox = InMemoryOutboxStore::new();
        let dlq_store = InMemoryDlqStore::new();
        let dlq = Arc::new(DeadLetterService::new(
            dlq_store.clone(),
            InMemoryBus::new(),
            DlqConfig::default(),
        ));
        let guard = IdempotencyGuard::select(
            &IdempotencyConfig::default(),
            Some(Arc::new(InMemoryIdempotencyStore::new())),
        );
        let action = TestAction::new(mode);

        let listener = SagaListener::new(
            saga_store.clone(),
            outbox.clone(),
            dlq,
            guard,
            ResilientInvoker::new(resilience),
            action.clone(),
            ListenerConfig {
                service_name: "payment-service".to_string(),
                ..Default::default()
            },
        );

        Fixture {
            listener,
            action,
            saga_store,
            outbox,
            dlq_store,
        }
    }

    fn fast_resilience() -> ResilienceConfig {
        ResilienceConfig::new().with_defaults(ResilienceSettings {
            wait_duration: Duration::from_millis(1),
            minimum_number_of_calls: 2,
            max_attempts: 2,
            wait_duration_in_open_state: Duration::from_secs(60),
            ..Default::default()
        })
    }

    fn payment_event() -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("StockReserved")
            .saga_type("order-fulfillment")
            .step_number(2)
            .payload(serde_json::json!({"sku": "W-1"}))
            .build()
    }

    #[tokio::test]
    async fn success_records_step_and_queues_next_event() {
        let f = fixture(Mode::Advance, fast_resilience());
        let event = payment_event();

        let outcome = f.listener.process("payments", &event).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);

        let saga = f.saga_store.get(event.saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::InProgress);
        assert_eq!(saga.step(2).unwrap().status, StepStatus::Completed);

        let queued = f.outbox.claim_pending(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].topic, "shipping");
        assert_eq!(queued[0].event.event_type, "PaymentCharged");
        assert_eq!(queued[0].event.step_number, 3);
        assert_eq!(queued[0].event.saga_id, event.saga_id);
        assert!(!queued[0].event.is_compensating);
    }

    #[tokio::test]
    async fn final_step_completes_the_saga() {
        let f = fixture(Mode::Complete, fast_resilience());
        let event = payment_event();

        f.listener.process("payments", &event).await.unwrap();

        let saga = f.saga_store.get(event.saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::Completed);
        assert_eq!(f.outbox.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listener_processes_events_delivered_through_the_bus() {
        let f = fixture(Mode::Advance, fast_resilience());
        let bus = InMemoryBus::new();
        bus.subscribe("payments", Arc::new(f.listener)).await.unwrap();

        let event = payment_event();
        bus.publish("payments", &event).await.unwrap();

        let saga = f.saga_store.get(event.saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::InProgress);
        assert_eq!(f.outbox.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_skipped() {
        let f = fixture(Mode::Advance, fast_resilience());
        let event = payment_event();

        assert_eq!(
            f.listener.process("payments", &event).await.unwrap(),
            ProcessOutcome::Processed
        );
        assert_eq!(
            f.listener.process("payments", &event).await.unwrap(),
            ProcessOutcome::DuplicateSkipped
        );
        assert_eq!(f.action.call_count(), 1);
        assert_eq!(f.outbox.entry_count().await, 1);
    }

    #[tokio::test]
    async fn business_failure_dead_letters_without_retry() {
        let f = fixture(Mode::FailBusiness, fast_resilience());
        let event = payment_event();

        let outcome = f.listener.process("payments", &event).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::DeadLettered);
        assert_eq!(f.action.call_count(), 1);

        let saga = f.saga_store.get(event.saga_id).await.unwrap().unwrap();
        let step = saga.step(2).unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert!(step.failure_reason.as_deref().unwrap().contains("declined"));

        let captured = f.dlq_store.list(10).await.unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].source_service, "payment-service");
        assert_eq!(captured[0].topic, "payments");
        assert_eq!(captured[0].original_event_id, event.event_id);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_dead_letters() {
        let f = fixture(Mode::FailTransient, fast_resilience());
        let event = payment_event();

        let outcome = f.listener.process("payments", &event).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::DeadLettered);
        assert_eq!(f.action.call_count(), 2);
        assert_eq!(f.dlq_store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn open_circuit_defers_instead_of_dead_lettering() {
        let f = fixture(Mode::FailTransient, fast_resilience());

        // One event burns both attempts: two failures at min calls 2 trips
        // the breaker before the next event arrives.
        f.listener.process("payments", &payment_event()).await.unwrap();
        assert_eq!(f.dlq_store.pending_count().await.unwrap(), 1);

        let deferred = payment_event();
        let outcome = f.listener.process("payments", &deferred).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Deferred);

        // Not dead-lettered, no step recorded for it.
        assert_eq!(f.dlq_store.pending_count().await.unwrap(), 1);
        let saga = f.saga_store.get(deferred.saga_id).await.unwrap().unwrap();
        assert!(saga.step(2).is_none());

        // The claim was released: redelivery is deferred again, not
        // mistaken for a duplicate.
        let outcome = f.listener.process("payments", &deferred).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Deferred);
    }
}
