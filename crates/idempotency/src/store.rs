//! Idempotency store abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Shared key store with an atomic put-if-absent claim.
///
/// Existence of a key is the whole signal: present means "already
/// processed", absent means "not yet". Entries expire after their TTL so
/// memory stays bounded; the TTL must exceed the maximum expected
/// duplicate-delivery window.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically inserts the key if absent (or expired), with the given
    /// TTL. Returns true when this caller won the claim.
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Returns true if the key is present and unexpired.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Removes a key so the next claim on it wins again. Used when a claimed
    /// event could not be processed at all and must be redeliverable.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes expired entries, returning how many were purged.
    async fn purge_expired(&self) -> Result<u64>;
}
