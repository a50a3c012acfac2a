//! Background detection of sagas stuck past their deadline.

use std::time::Duration;

use chrono::Utc;
use outbox::OutboxStore;
use tokio::sync::watch;

use crate::compensator::Compensator;
use crate::state::SagaStatus;
use crate::store::SagaStore;
use crate::Result;

/// Timeout detector configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// How often the detector scans for expired sagas.
    pub scan_interval: Duration,
    /// Maximum sagas timed out per scan (backpressure bound after a long
    /// detector outage).
    pub max_batch: usize,
    /// When true, expired sagas are compensated immediately after the
    /// TIMED_OUT transition.
    pub auto_compensate: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            max_batch: 50,
            auto_compensate: true,
        }
    }
}

/// Periodically scans the saga store and drives expired sagas through
/// TIMED_OUT into compensation.
///
/// A timeout is a state-machine transition, not an error: STARTED and
/// IN_PROGRESS sagas past their deadline move to TIMED_OUT, then (with
/// auto-compensation on) end COMPENSATED, or FAILED when the unwind itself
/// cannot complete.
pub struct TimeoutDetector<S, O> {
    store: S,
    compensator: Compensator<S, O>,
    config: TimeoutConfig,
}

impl<S, O> TimeoutDetector<S, O>
where
    S: SagaStore,
    O: OutboxStore,
{
    /// Creates a new detector over the given store and compensator.
    pub fn new(store: S, compensator: Compensator<S, O>, config: TimeoutConfig) -> Self {
        Self {
            store,
            compensator,
            config,
        }
    }

    /// Runs the scan loop until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.scan_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            max_batch = self.config.max_batch,
            auto_compensate = self.config.auto_compensate,
            "timeout detector started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "timeout scan failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("timeout detector shutting down");
                    return;
                }
            }
        }
    }

    /// One scan pass. Returns how many sagas were timed out.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<usize> {
        let expired = self
            .store
            .find_expired(Utc::now(), self.config.max_batch)
            .await?;
        let mut timed_out = 0;

        for saga in expired {
            // A saga still COMPENSATING past its deadline means a previous
            // unwind was interrupted; resume it instead of timing it out
            // again. compensate() skips steps that were already undone.
            if saga.status == SagaStatus::Compensating {
                if !self.config.auto_compensate {
                    continue;
                }
                tracing::warn!(saga_id = %saga.saga_id, "resuming interrupted compensation");
                if let Err(e) = self.compensator.compensate(saga.saga_id).await {
                    tracing::error!(saga_id = %saga.saga_id, error = %e, "compensation failed");
                    self.store
                        .update_status(saga.saga_id, SagaStatus::Failed)
                        .await?;
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                }
                continue;
            }

            // Another detector instance may have won this saga already.
            if !self
                .store
                .update_status(saga.saga_id, SagaStatus::TimedOut)
                .await?
            {
                continue;
            }

            timed_out += 1;
            metrics::counter!("saga_timeouts_total").increment(1);
            tracing::warn!(
                saga_id = %saga.saga_id,
                saga_type = %saga.saga_type,
                deadline = %saga.deadline,
                "saga timed out"
            );

            if !self.config.auto_compensate {
                continue;
            }

            if let Err(e) = self.compensator.compensate(saga.saga_id).await {
                tracing::error!(saga_id = %saga.saga_id, error = %e, "compensation failed");
                self.store
                    .update_status(saga.saga_id, SagaStatus::Failed)
                    .await?;
                metrics::counter!("saga_compensation_failures_total").increment(1);
            }
        }

        Ok(timed_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{SagaInstance, SagaStepRecord};
    use crate::memory::InMemorySagaStore;
    use crate::registry::CompensationRegistry;
    use chrono::{DateTime, Utc};
    use common::{CorrelationId, SagaId};
    use outbox::InMemoryOutboxStore;

    fn detector(
        config: TimeoutConfig,
    ) -> (
        TimeoutDetector<InMemorySagaStore, InMemoryOutboxStore>,
        InMemorySagaStore,
        InMemoryOutboxStore,
    ) {
        let store = InMemorySagaStore::new();
        let outbox = InMemoryOutboxStore::new();
        let registry = CompensationRegistry::builder()
            .map("OrderCreated", "OrderCancelled", "order-service")
            .map("StockReserved", "StockReleased", "inventory-service")
            .build();
        let compensator = Compensator::new(store.clone(), outbox.clone(), registry);
        let detector = TimeoutDetector::new(store.clone(), compensator, config);
        (detector, store, outbox)
    }

    async fn expired_saga(store: &InMemorySagaStore, deadline: DateTime<Utc>) -> SagaId {
        let mut saga = SagaInstance::new(
            SagaId::new(),
            "order-fulfillment",
            CorrelationId::new(),
            deadline,
        );
        saga.record_step(SagaStepRecord::completed(0, "OrderCreated"));
        let saga_id = saga.saga_id;
        store.create(saga).await.unwrap();
        saga_id
    }

    #[tokio::test]
    async fn expired_saga_ends_compensated() {
        let (detector, store, outbox) = detector(TimeoutConfig::default());
        let saga_id =
            expired_saga(&store, Utc::now() - chrono::Duration::minutes(1)).await;

        let timed_out = detector.tick().await.unwrap();
        assert_eq!(timed_out, 1);

        let saga = store.get(saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::Compensated);
        assert_eq!(outbox.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn live_saga_is_untouched() {
        let (detector, store, _outbox) = detector(TimeoutConfig::default());
        let saga_id =
            expired_saga(&store, Utc::now() + chrono::Duration::minutes(5)).await;

        let timed_out = detector.tick().await.unwrap();
        assert_eq!(timed_out, 0);

        let saga = store.get(saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::Started);
    }

    #[tokio::test]
    async fn auto_compensation_can_be_disabled() {
        let config = TimeoutConfig {
            auto_compensate: false,
            ..Default::default()
        };
        let (detector, store, outbox) = detector(config);
        let saga_id =
            expired_saga(&store, Utc::now() - chrono::Duration::minutes(1)).await;

        detector.tick().await.unwrap();

        let saga = store.get(saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::TimedOut);
        assert_eq!(outbox.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scan_batch_is_bounded() {
        let config = TimeoutConfig {
            max_batch: 2,
            ..Default::default()
        };
        let (detector, store, _outbox) = detector(config);

        for i in 0..5 {
            expired_saga(&store, Utc::now() - chrono::Duration::minutes(i + 1)).await;
        }

        assert_eq!(detector.tick().await.unwrap(), 2);
        assert_eq!(detector.tick().await.unwrap(), 2);
        assert_eq!(detector.tick().await.unwrap(), 1);
        assert_eq!(detector.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn interrupted_compensation_is_resumed() {
        let (detector, store, outbox) = detector(TimeoutConfig::default());
        let saga_id =
            expired_saga(&store, Utc::now() - chrono::Duration::minutes(1)).await;

        // A crash mid-unwind leaves the saga COMPENSATING with its step
        // still marked completed.
        store
            .update_status(saga_id, SagaStatus::Compensating)
            .await
            .unwrap();

        let timed_out = detector.tick().await.unwrap();
        // A resumed unwind is not a fresh timeout.
        assert_eq!(timed_out, 0);

        let saga = store.get(saga_id).await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::Compensated);
        assert_eq!(saga.steps[0].status, crate::state::StepStatus::Compensated);
        assert_eq!(outbox.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_pass_sees_no_expired_sagas() {
        let (detector, store, _outbox) = detector(TimeoutConfig::default());
        expired_saga(&store, Utc::now() - chrono::Duration::minutes(1)).await;

        assert_eq!(detector.tick().await.unwrap(), 1);
        // Already COMPENSATED: no longer active, not rescanned.
        assert_eq!(detector.tick().await.unwrap(), 0);
    }
}
