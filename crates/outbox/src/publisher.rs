//! Background delivery loop draining the outbox onto the bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bus::MessageBus;
use chrono::Utc;
use tokio::sync::watch;

use crate::{OutboxStore, Result};

/// Outbox configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// When false, the publisher loop never starts.
    pub enabled: bool,
    /// How often the publisher polls for pending entries.
    pub poll_interval: Duration,
    /// Maximum entries delivered per polling pass (backpressure bound).
    pub max_batch_size: usize,
    /// Failed attempts before an entry is marked permanently FAILED.
    pub max_retries: u32,
    /// Delivered entries older than this are purged.
    pub entry_ttl: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(1),
            max_batch_size: 50,
            max_retries: 5,
            entry_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Polls the outbox on a fixed interval and publishes pending entries.
///
/// Delivery is at-least-once: a crash between a successful publish and
/// `mark_delivered` redelivers on the next poll. When the bus is
/// unreachable, the publisher logs once per outage and leaves entries
/// PENDING; it never drops data.
pub struct OutboxPublisher<S, B> {
    store: S,
    bus: B,
    config: OutboxConfig,
    bus_down: AtomicBool,
}

impl<S, B> OutboxPublisher<S, B>
where
    S: OutboxStore,
    B: MessageBus,
{
    /// Creates a new publisher over the given store and bus.
    pub fn new(store: S, bus: B, config: OutboxConfig) -> Self {
        Self {
            store,
            bus,
            config,
            bus_down: AtomicBool::new(false),
        }
    }

    /// Runs the polling loop until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!("outbox publisher disabled by configuration");
            return;
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_batch = self.config.max_batch_size,
            "outbox publisher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "outbox polling pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("outbox publisher shutting down");
                    return;
                }
            }
        }
    }

    /// One polling pass: claim a bounded batch, attempt delivery, settle
    /// each entry, purge expired delivered entries.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<()> {
        let batch = self.store.claim_pending(self.config.max_batch_size).await?;

        for entry in batch {
            match self.bus.publish(&entry.topic, &entry.event).await {
                Ok(()) => {
                    if self.bus_down.swap(false, Ordering::SeqCst) {
                        tracing::info!("bus reachable again, resuming delivery");
                    }
                    self.store.mark_delivered(entry.event_id).await?;
                    metrics::counter!("outbox_delivered_total").increment(1);
                }
                Err(e) if e.is_unavailable() => {
                    // Whole-bus outage: log once, release the claim, and
                    // leave everything PENDING for the next poll.
                    if !self.bus_down.swap(true, Ordering::SeqCst) {
                        tracing::warn!(error = %e, "bus unreachable, entries stay pending");
                    }
                    self.store.release(entry.event_id).await?;
                    return Ok(());
                }
                Err(e) => {
                    let attempts = self
                        .store
                        .increment_retry(entry.event_id, &e.to_string())
                        .await?;

                    if attempts >= self.config.max_retries {
                        tracing::error!(
                            event_id = %entry.event_id,
                            topic = %entry.topic,
                            attempts,
                            error = %e,
                            "outbox entry failed permanently"
                        );
                        self.store
                            .mark_failed(entry.event_id, &e.to_string())
                            .await?;
                        metrics::counter!("outbox_failed_total").increment(1);
                    } else {
                        tracing::warn!(
                            event_id = %entry.event_id,
                            attempts,
                            error = %e,
                            "outbox delivery attempt failed"
                        );
                        metrics::counter!("outbox_retries_total").increment(1);
                    }
                }
            }
        }

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.entry_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        self.store.purge_delivered(cutoff).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryOutboxStore, OutboxEntry, OutboxStatus};
    use bus::InMemoryBus;
    use common::EventEnvelope;

    fn publisher(
        config: OutboxConfig,
    ) -> (
        OutboxPublisher<InMemoryOutboxStore, InMemoryBus>,
        InMemoryOutboxStore,
        InMemoryBus,
    ) {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryBus::new();
        let publisher = OutboxPublisher::new(store.clone(), bus.clone(), config);
        (publisher, store, bus)
    }

    fn entry(event_type: &str) -> OutboxEntry {
        OutboxEntry::new(
            "orders",
            EventEnvelope::builder().event_type(event_type).build(),
        )
    }

    #[tokio::test]
    async fn delivers_and_marks_delivered() {
        let (publisher, store, bus) = publisher(OutboxConfig::default());
        let e = entry("OrderCreated");
        store.write(e.clone()).await.unwrap();

        publisher.tick().await.unwrap();

        assert_eq!(bus.published_event_types("orders"), ["OrderCreated"]);
        let stored = store.get(e.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Delivered);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_is_bounded_per_pass() {
        let config = OutboxConfig {
            max_batch_size: 2,
            ..Default::default()
        };
        let (publisher, store, bus) = publisher(config);

        for i in 0..5 {
            store.write(entry(&format!("Event{i}"))).await.unwrap();
        }

        publisher.tick().await.unwrap();
        assert_eq!(bus.published_count(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rejection_increments_then_fails_permanently() {
        let config = OutboxConfig {
            max_retries: 2,
            ..Default::default()
        };
        let (publisher, store, bus) = publisher(config);
        bus.set_fail_on_publish(true);

        let e = entry("OrderCreated");
        store.write(e.clone()).await.unwrap();

        publisher.tick().await.unwrap();
        let stored = store.get(e.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retry_count, 1);

        publisher.tick().await.unwrap();
        let stored = store.get(e.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Failed);
        assert!(stored.failure_reason.is_some());
    }

    #[tokio::test]
    async fn outage_leaves_entries_pending_indefinitely() {
        let config = OutboxConfig {
            max_retries: 1,
            ..Default::default()
        };
        let (publisher, store, bus) = publisher(config);
        bus.set_unavailable(true);

        let e = entry("OrderCreated");
        store.write(e.clone()).await.unwrap();

        // Many passes during the outage: no retries burned, still pending.
        for _ in 0..5 {
            publisher.tick().await.unwrap();
        }
        let stored = store.get(e.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retry_count, 0);

        // Bus recovers: the entry is delivered.
        bus.set_unavailable(false);
        publisher.tick().await.unwrap();
        let stored = store.get(e.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Delivered);
    }

    #[tokio::test]
    async fn every_entry_settles_once_bus_recovers() {
        // At-least-once property: N entries against a bus that rejects then
        // recovers all end DELIVERED or FAILED, none stay PENDING.
        let config = OutboxConfig {
            max_retries: 3,
            ..Default::default()
        };
        let (publisher, store, bus) = publisher(config);

        for i in 0..4 {
            store.write(entry(&format!("Event{i}"))).await.unwrap();
        }

        bus.set_fail_on_publish(true);
        publisher.tick().await.unwrap();
        bus.set_fail_on_publish(false);

        for _ in 0..3 {
            publisher.tick().await.unwrap();
        }

        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(bus.published_count(), 4);
    }

    #[tokio::test]
    async fn purges_delivered_entries_past_ttl() {
        let config = OutboxConfig {
            entry_ttl: Duration::from_secs(0),
            ..Default::default()
        };
        let (publisher, store, _bus) = publisher(config);

        let e = entry("OrderCreated");
        store.write(e.clone()).await.unwrap();

        publisher.tick().await.unwrap();
        // Delivered on the first pass, purged on the second.
        publisher.tick().await.unwrap();
        assert!(store.get(e.event_id).await.unwrap().is_none());
    }
}
