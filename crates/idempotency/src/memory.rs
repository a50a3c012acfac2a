use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{IdempotencyStore, Result};

/// In-memory idempotency store for testing.
///
/// Provides the same atomic claim semantics as the PostgreSQL
/// implementation, scoped to one process.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, expired ones included.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(existing) if *existing > now => Ok(false),
            _ => {
                // Absent or expired: this caller wins the claim.
                entries.insert(key.to_string(), expires_at);
                Ok(true)
            }
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| *e > Utc::now()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_claim_wins_second_loses() {
        let store = InMemoryIdempotencyStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.put_if_absent("evt-1", ttl).await.unwrap());
        assert!(!store.put_if_absent("evt-1", ttl).await.unwrap());
        assert!(store.contains("evt-1").await.unwrap());
    }

    #[tokio::test]
    async fn distinct_keys_claim_independently() {
        let store = InMemoryIdempotencyStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.put_if_absent("evt-1", ttl).await.unwrap());
        assert!(store.put_if_absent("evt-2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_key_can_be_reclaimed() {
        let store = InMemoryIdempotencyStore::new();

        assert!(
            store
                .put_if_absent("evt-1", Duration::from_secs(0))
                .await
                .unwrap()
        );
        assert!(!store.contains("evt-1").await.unwrap());
        assert!(
            store
                .put_if_absent("evt-1", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemoryIdempotencyStore::new();

        store
            .put_if_absent("evt-old", Duration::from_secs(0))
            .await
            .unwrap();
        store
            .put_if_absent("evt-live", Duration::from_secs(60))
            .await
            .unwrap();

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_claims_exactly_one_winner() {
        let store = InMemoryIdempotencyStore::new();
        let ttl = Duration::from_secs(60);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put_if_absent("evt-1", ttl).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
