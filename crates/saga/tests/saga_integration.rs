//! End-to-end test of the coordination layer: listeners, idempotency,
//! resilience, DLQ capture, timeout detection, and compensation, wired
//! together over the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus::InMemoryBus;
use common::{CorrelationId, EventEnvelope, SagaId};
use dlq::{DeadLetterService, DlqConfig, DlqStore, InMemoryDlqStore};
use idempotency::{IdempotencyConfig, IdempotencyGuard, InMemoryIdempotencyStore};
use outbox::{InMemoryOutboxStore, OutboxConfig, OutboxPublisher, OutboxStore};
use resilience::{OperationError, ResilienceConfig, ResilienceSettings, ResilientInvoker};
use saga::{
    CompensationRegistry, Compensator, InMemorySagaStore, ListenerConfig, ProcessOutcome,
    SagaListener, SagaStatus, SagaStore, StepAction, StepOutcome, StepStatus, TimeoutConfig,
    TimeoutDetector,
};

/// Advances the saga by queueing the next forward event.
struct AdvanceAction {
    name: &'static str,
    next_topic: &'static str,
    next_event_type: &'static str,
}

#[async_trait]
impl StepAction for AdvanceAction {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, _event: &EventEnvelope) -> Result<StepOutcome, OperationError> {
        Ok(StepOutcome::Continue {
            topic: self.next_topic.to_string(),
            event_type: self.next_event_type.to_string(),
            payload: serde_json::json!({}),
        })
    }
}

/// Declines every charge: a definitive business outcome, never retried.
struct DecliningPaymentAction;

#[async_trait]
impl StepAction for DecliningPaymentAction {
    fn name(&self) -> &str {
        "charge-payment"
    }

    async fn run(&self, _event: &EventEnvelope) -> Result<StepOutcome, OperationError> {
        Err(OperationError::business("payment declined"))
    }
}

struct Harness {
    saga_store: InMemorySagaStore,
    outbox: InMemoryOutboxStore,
    dlq_store: InMemoryDlqStore,
    bus: InMemoryBus,
    guard: IdempotencyGuard,
    invoker: ResilientInvoker,
    dlq: Arc<DeadLetterService<InMemoryDlqStore, InMemoryBus>>,
}

impl Harness {
    fn new() -> Self {
        let saga_store = InMemorySagaStore::new();
        let outbox = InMemoryOutboxStore::new();
        let dlq_store = InMemoryDlqStore::new();
        let bus = InMemoryBus::new();
        let guard = IdempotencyGuard::select(
            &IdempotencyConfig::default(),
            Some(Arc::new(InMemoryIdempotencyStore::new())),
        );
        let invoker = ResilientInvoker::new(ResilienceConfig::new().with_defaults(
            ResilienceSettings {
                wait_duration: Duration::from_millis(1),
                ..Default::default()
            },
        ));
        let dlq = Arc::new(DeadLetterService::new(
            dlq_store.clone(),
            bus.clone(),
            DlqConfig::default(),
        ));

        Self {
            saga_store,
            outbox,
            dlq_store,
            bus,
            guard,
            invoker,
            dlq,
        }
    }

    fn listener(
        &self,
        service_name: &str,
        action: Arc<dyn StepAction>,
    ) -> SagaListener<InMemorySagaStore, InMemoryOutboxStore, InMemoryDlqStore, InMemoryBus> {
        SagaListener::new(
            self.saga_store.clone(),
            self.outbox.clone(),
            self.dlq.clone(),
            self.guard.clone(),
            self.invoker.clone(),
            action,
            ListenerConfig {
                service_name: service_name.to_string(),
                // Sagas expire immediately so the detector can fire on demand.
                saga_timeout: Duration::from_secs(0),
            },
        )
    }

    fn detector(&self) -> TimeoutDetector<InMemorySagaStore, InMemoryOutboxStore> {
        let registry = CompensationRegistry::builder()
            .map("OrderCreated", "OrderCancelled", "order-service")
            .map("StockReserved", "StockReleased", "inventory-service")
            .build();
        let compensator = Compensator::new(self.saga_store.clone(), self.outbox.clone(), registry);
        TimeoutDetector::new(self.saga_store.clone(), compensator, TimeoutConfig::default())
    }

    fn publisher(&self) -> OutboxPublisher<InMemoryOutboxStore, InMemoryBus> {
        OutboxPublisher::new(self.outbox.clone(), self.bus.clone(), OutboxConfig::default())
    }
}

fn event(saga_id: SagaId, correlation_id: CorrelationId, step: u32, event_type: &str) -> EventEnvelope {
    EventEnvelope::builder()
        .event_type(event_type)
        .saga_id(saga_id)
        .saga_type("order-fulfillment")
        .correlation_id(correlation_id)
        .step_number(step)
        .payload(serde_json::json!({"order": "ord-1"}))
        .build()
}

#[tokio::test]
async fn declined_payment_saga_is_compensated_end_to_end() {
    let h = Harness::new();
    let saga_id = SagaId::new();
    let correlation_id = CorrelationId::new();

    let order_listener = h.listener(
        "order-service",
        Arc::new(AdvanceAction {
            name: "create-order",
            next_topic: "inventory",
            next_event_type: "StockReserved",
        }),
    );
    let inventory_listener = h.listener(
        "inventory-service",
        Arc::new(AdvanceAction {
            name: "reserve-stock",
            next_topic: "payments",
            next_event_type: "PaymentRequested",
        }),
    );
    let payment_listener = h.listener("payment-service", Arc::new(DecliningPaymentAction));

    // Steps 0 and 1 complete normally.
    let outcome = order_listener
        .process("orders", &event(saga_id, correlation_id, 0, "OrderCreated"))
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::Processed);

    let outcome = inventory_listener
        .process("inventory", &event(saga_id, correlation_id, 1, "StockReserved"))
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::Processed);

    let saga = h.saga_store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(saga.status, SagaStatus::InProgress);
    assert_eq!(saga.step(0).unwrap().status, StepStatus::Completed);
    assert_eq!(saga.step(1).unwrap().status, StepStatus::Completed);

    // Step 2: the charge is declined. Non-retryable, straight to the DLQ.
    let payment_event = event(saga_id, correlation_id, 2, "PaymentRequested");
    let outcome = payment_listener
        .process("payments", &payment_event)
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::DeadLettered);

    let captured = h.dlq_store.list(10).await.unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].source_service, "payment-service");
    assert!(captured[0].failure_reason.contains("payment declined"));
    assert_eq!(captured[0].saga_id, Some(saga_id));

    // The deadline has passed: the detector times the saga out and the
    // compensator unwinds it, step 1 before step 0.
    let timed_out = h.detector().tick().await.unwrap();
    assert_eq!(timed_out, 1);

    let saga = h.saga_store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(saga.status, SagaStatus::Compensated);
    assert_eq!(saga.step(0).unwrap().status, StepStatus::Compensated);
    assert_eq!(saga.step(1).unwrap().status, StepStatus::Compensated);
    assert_eq!(saga.step(2).unwrap().status, StepStatus::Failed);

    // Drain the outbox and check what actually reached the bus.
    h.publisher().tick().await.unwrap();

    assert_eq!(
        h.bus.published_event_types("inventory-service"),
        ["StockReleased"]
    );
    assert_eq!(
        h.bus.published_event_types("order-service"),
        ["OrderCancelled"]
    );

    // StockReleased was queued before OrderCancelled (reverse step order).
    let compensating: Vec<String> = h
        .bus
        .published()
        .into_iter()
        .filter(|(_, e)| e.is_compensating)
        .map(|(_, e)| e.event_type)
        .collect();
    assert_eq!(compensating, ["StockReleased", "OrderCancelled"]);

    // Nothing left pending once delivery settles.
    assert_eq!(h.outbox.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn redelivered_event_advances_the_saga_only_once() {
    let h = Harness::new();
    let saga_id = SagaId::new();
    let correlation_id = CorrelationId::new();

    let listener = h.listener(
        "order-service",
        Arc::new(AdvanceAction {
            name: "create-order",
            next_topic: "inventory",
            next_event_type: "StockReserved",
        }),
    );

    let e = event(saga_id, correlation_id, 0, "OrderCreated");
    assert_eq!(
        listener.process("orders", &e).await.unwrap(),
        ProcessOutcome::Processed
    );
    // At-least-once delivery hands the same event over again.
    assert_eq!(
        listener.process("orders", &e).await.unwrap(),
        ProcessOutcome::DuplicateSkipped
    );

    assert_eq!(h.outbox.pending_count().await.unwrap(), 1);
    let saga = h.saga_store.get(saga_id).await.unwrap().unwrap();
    assert_eq!(saga.steps.len(), 1);
}

#[tokio::test]
async fn dlq_replay_feeds_the_event_back_through_the_bus() {
    let h = Harness::new();
    let saga_id = SagaId::new();
    let correlation_id = CorrelationId::new();

    let payment_listener = h.listener("payment-service", Arc::new(DecliningPaymentAction));
    let payment_event = event(saga_id, correlation_id, 2, "PaymentRequested");
    payment_listener
        .process("payments", &payment_event)
        .await
        .unwrap();

    let captured = h.dlq_store.list(1).await.unwrap();
    let entry_id = captured[0].id;

    let replayed = h.dlq.replay(entry_id).await.unwrap();
    assert_eq!(replayed.replay_count, 1);

    // The exact stored event went back out on its original topic.
    let published = h.bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "payments");
    assert_eq!(published[0].1.event_id, payment_event.event_id);
}
