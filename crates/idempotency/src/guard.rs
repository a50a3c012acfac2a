//! The guard consumed by saga listeners.

use std::sync::Arc;
use std::time::Duration;

use common::EventId;

use crate::IdempotencyStore;

/// Idempotency configuration.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// When false, every event is processed (no deduplication).
    pub enabled: bool,
    /// How long a claim is remembered. Must exceed the maximum expected
    /// duplicate-delivery window.
    pub ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Claim-once guard, selected once at startup.
///
/// Two variants: store-backed when a shared store is available and the
/// feature is enabled, pass-through otherwise. Misconfiguration degrades to
/// "process everything", never to a failure.
#[derive(Clone)]
pub enum IdempotencyGuard {
    /// Claims go through the shared store.
    Enabled {
        store: Arc<dyn IdempotencyStore>,
        ttl: Duration,
    },
    /// No deduplication; every event is processed.
    Passthrough,
}

impl IdempotencyGuard {
    /// Probes the configuration and store availability once and picks the
    /// variant to run with.
    pub fn select(config: &IdempotencyConfig, store: Option<Arc<dyn IdempotencyStore>>) -> Self {
        match store {
            Some(store) if config.enabled => Self::Enabled {
                store,
                ttl: config.ttl,
            },
            Some(_) => {
                tracing::info!("idempotency disabled by configuration, events will not be deduplicated");
                Self::Passthrough
            }
            None => {
                tracing::warn!("no idempotency store available, events will not be deduplicated");
                Self::Passthrough
            }
        }
    }

    /// Creates a pass-through guard.
    pub fn passthrough() -> Self {
        Self::Passthrough
    }

    /// Returns true if the caller must process this event, false if another
    /// claim already won and the caller must skip it.
    pub async fn try_process(&self, event_id: EventId) -> bool {
        match self {
            Self::Passthrough => true,
            Self::Enabled { store, ttl } => {
                match store.put_if_absent(&event_id.to_string(), *ttl).await {
                    Ok(claimed) => {
                        if !claimed {
                            metrics::counter!("idempotency_duplicates_skipped_total").increment(1);
                            tracing::debug!(%event_id, "duplicate event skipped");
                        }
                        claimed
                    }
                    Err(e) => {
                        // A broken store must not stop processing.
                        tracing::warn!(%event_id, error = %e, "idempotency store failed, processing anyway");
                        true
                    }
                }
            }
        }
    }

    /// Gives a claimed event back so a redelivery can win it again. Called
    /// when the claimed event was never actually processed (an open circuit
    /// deferred it, say).
    pub async fn release(&self, event_id: EventId) {
        if let Self::Enabled { store, .. } = self
            && let Err(e) = store.remove(&event_id.to_string()).await
        {
            tracing::warn!(%event_id, error = %e, "failed to release idempotency claim");
        }
    }
}
