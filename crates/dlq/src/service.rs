//! Operator-facing dead letter service over a store and the bus.

use std::time::Duration;

use bus::MessageBus;
use chrono::Utc;

use crate::{DeadLetterEntry, DlqEntryId, DlqError, DlqStatus, DlqStore, Result};

/// DLQ configuration.
#[derive(Debug, Clone)]
pub struct DlqConfig {
    /// When false, failed events are logged but not captured.
    pub enabled: bool,
    /// Replays allowed per entry before further attempts are rejected.
    pub max_replay_attempts: u32,
    /// Terminal entries older than this are purged.
    pub entry_ttl: Duration,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_replay_attempts: 3,
            entry_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Capture, inspection, and replay of permanently failed events.
pub struct DeadLetterService<S, B> {
    store: S,
    bus: B,
    config: DlqConfig,
}

impl<S, B> DeadLetterService<S, B>
where
    S: DlqStore,
    B: MessageBus,
{
    /// Creates a new service over the given store and bus.
    pub fn new(store: S, bus: B, config: DlqConfig) -> Self {
        Self { store, bus, config }
    }

    /// Captures a failed event, best-effort.
    ///
    /// If the DLQ itself is unavailable the original failure is logged in
    /// full so nothing disappears silently, but the caller's critical path
    /// is never blocked by a capture error.
    pub async fn capture(&self, entry: DeadLetterEntry) {
        if !self.config.enabled {
            tracing::warn!(
                event_id = %entry.original_event_id,
                failure = %entry.failure_reason,
                "DLQ disabled, failed event not captured"
            );
            return;
        }

        let event_id = entry.original_event_id;
        let failure = entry.failure_reason.clone();
        let source = entry.source_service.clone();

        match self.store.add(entry).await {
            Ok(()) => {
                metrics::counter!("dlq_captured_total").increment(1);
                tracing::warn!(
                    event_id = %event_id,
                    source_service = %source,
                    failure = %failure,
                    "event captured in dead letter queue"
                );
            }
            Err(e) => {
                // The original failure must survive the DLQ failing too.
                tracing::error!(
                    event_id = %event_id,
                    source_service = %source,
                    original_failure = %failure,
                    dlq_error = %e,
                    "DLQ write failed, original failure preserved in log only"
                );
            }
        }
    }

    /// Lists up to `limit` entries, newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        self.store.list(limit).await
    }

    /// Returns a single entry.
    pub async fn get(&self, id: DlqEntryId) -> Result<Option<DeadLetterEntry>> {
        self.store.get(id).await
    }

    /// Number of entries needing operator attention.
    pub async fn pending_count(&self) -> Result<u64> {
        self.store.pending_count().await
    }

    /// Replays a pending entry: re-publishes the exact stored payload to
    /// its original topic, then flips the entry to REPLAYED.
    ///
    /// Rejected unless the entry is PENDING with replay budget left. Note
    /// that a replay landing before the original idempotency record expires
    /// is skipped by consumers as a duplicate; operators should wait out
    /// the idempotency TTL before replaying.
    #[tracing::instrument(skip(self))]
    pub async fn replay(&self, id: DlqEntryId) -> Result<DeadLetterEntry> {
        let entry = self.store.get(id).await?.ok_or(DlqError::NotFound(id))?;

        if entry.status != DlqStatus::Pending {
            return Err(DlqError::NotReplayable {
                id,
                reason: format!("status is {}", entry.status),
            });
        }
        if entry.replay_count >= self.config.max_replay_attempts {
            return Err(DlqError::ReplayLimitReached {
                id,
                count: entry.replay_count,
            });
        }

        self.bus.publish(&entry.topic, &entry.event).await?;

        if !self.store.mark_replayed(id).await? {
            // Lost a race with another operator after our publish went out;
            // consumers deduplicate, so just report the conflict.
            return Err(DlqError::NotReplayable {
                id,
                reason: "entry was settled concurrently".to_string(),
            });
        }

        metrics::counter!("dlq_replayed_total").increment(1);
        tracing::info!(entry_id = %id, topic = %entry.topic, "dead letter replayed");

        self.store.get(id).await?.ok_or(DlqError::NotFound(id))
    }

    /// Discards a pending entry without republishing.
    #[tracing::instrument(skip(self))]
    pub async fn discard(&self, id: DlqEntryId) -> Result<()> {
        let entry = self.store.get(id).await?.ok_or(DlqError::NotFound(id))?;

        if !self.store.mark_discarded(id).await? {
            return Err(DlqError::NotReplayable {
                id,
                reason: format!("status is {}", entry.status),
            });
        }

        metrics::counter!("dlq_discarded_total").increment(1);
        tracing::info!(entry_id = %id, "dead letter discarded");
        Ok(())
    }

    /// Purges terminal entries past their TTL.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.entry_ttl)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        self.store.purge_terminal(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDlqStore;
    use bus::InMemoryBus;
    use common::EventEnvelope;

    fn service(
        config: DlqConfig,
    ) -> (
        DeadLetterService<InMemoryDlqStore, InMemoryBus>,
        InMemoryDlqStore,
        InMemoryBus,
    ) {
        let store = InMemoryDlqStore::new();
        let bus = InMemoryBus::new();
        let service = DeadLetterService::new(store.clone(), bus.clone(), config);
        (service, store, bus)
    }

    fn entry(event_type: &str) -> DeadLetterEntry {
        DeadLetterEntry::new(
            "payments",
            EventEnvelope::builder()
                .event_type(event_type)
                .payload(serde_json::json!({"amount_cents": 4500}))
                .build(),
            "payment declined",
            "payment-service",
        )
    }

    #[tokio::test]
    async fn capture_and_count() {
        let (service, _store, _bus) = service(DlqConfig::default());

        service.capture(entry("PaymentCharged")).await;
        assert_eq!(service.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn capture_disabled_stores_nothing() {
        let config = DlqConfig {
            enabled: false,
            ..Default::default()
        };
        let (service, store, _bus) = service(config);

        service.capture(entry("PaymentCharged")).await;
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn replay_republishes_exact_payload() {
        let (service, _store, bus) = service(DlqConfig::default());
        let e = entry("PaymentCharged");
        let original_payload = e.event.payload.clone();
        service.capture(e.clone()).await;

        let replayed = service.replay(e.id).await.unwrap();

        assert_eq!(replayed.status, DlqStatus::Replayed);
        assert_eq!(replayed.replay_count, 1);
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "payments");
        assert_eq!(published[0].1.payload, original_payload);
        assert_eq!(published[0].1.event_id, e.event.event_id);
    }

    #[tokio::test]
    async fn replay_rejected_for_terminal_entries() {
        let (service, _store, _bus) = service(DlqConfig::default());

        let replayed = entry("A");
        service.capture(replayed.clone()).await;
        service.replay(replayed.id).await.unwrap();
        assert!(matches!(
            service.replay(replayed.id).await,
            Err(DlqError::NotReplayable { .. })
        ));

        let discarded = entry("B");
        service.capture(discarded.clone()).await;
        service.discard(discarded.id).await.unwrap();
        assert!(matches!(
            service.replay(discarded.id).await,
            Err(DlqError::NotReplayable { .. })
        ));
    }

    #[tokio::test]
    async fn replay_limit_is_enforced() {
        let config = DlqConfig {
            max_replay_attempts: 2,
            ..Default::default()
        };
        let (service, store, _bus) = service(config);

        let mut e = entry("PaymentCharged");
        // Entry already replayed twice and re-opened by an operator path.
        e.replay_count = 2;
        store.add(e.clone()).await.unwrap();

        assert!(matches!(
            service.replay(e.id).await,
            Err(DlqError::ReplayLimitReached { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn replay_missing_entry() {
        let (service, _store, _bus) = service(DlqConfig::default());
        assert!(matches!(
            service.replay(DlqEntryId::new()).await,
            Err(DlqError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn replay_bus_failure_keeps_entry_pending() {
        let (service, _store, bus) = service(DlqConfig::default());
        let e = entry("PaymentCharged");
        service.capture(e.clone()).await;

        bus.set_fail_on_publish(true);
        assert!(matches!(
            service.replay(e.id).await,
            Err(DlqError::Bus(_))
        ));

        let stored = service.get(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DlqStatus::Pending);
        assert_eq!(stored.replay_count, 0);
    }

    #[tokio::test]
    async fn discard_flips_without_publishing() {
        let (service, _store, bus) = service(DlqConfig::default());
        let e = entry("PaymentCharged");
        service.capture(e.clone()).await;

        service.discard(e.id).await.unwrap();

        let stored = service.get(e.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DlqStatus::Discarded);
        assert_eq!(bus.published_count(), 0);
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }
}
