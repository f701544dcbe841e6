//! In-memory query cache adapter

use crate::error::CacheResult;
use crate::traits::QueryCache;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Process-local [`QueryCache`] with per-key TTL.
///
/// Expired entries are hidden from reads immediately and physically removed
/// either on the next read of that key or by [`InMemoryQueryCache::purge_expired`].
#[derive(Clone, Default)]
pub struct InMemoryQueryCache {
    data: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

impl InMemoryQueryCache {
    /// Create new in-memory cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired(now));
        before - data.len()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

#[async_trait]
impl QueryCache for InMemoryQueryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = Instant::now();
        {
            let data = self.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict lazily
        let mut data = self.data.write();
        if data.get(key).is_some_and(|entry| entry.is_expired(now)) {
            data.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.data.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn supports_prefix_delete(&self) -> bool {
        true
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|key, _| !key.starts_with(prefix));
        let removed = before - data.len();
        tracing::debug!(prefix, removed, "Deleted cache entries by prefix");
        Ok(removed)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryQueryCache::new();

        cache
            .set("users:1", json!({"name": "Alice"}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("users:1").await.unwrap(),
            Some(json!({"name": "Alice"}))
        );

        cache.delete("users:1").await.unwrap();
        assert_eq!(cache.get("users:1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = InMemoryQueryCache::new();
        cache
            .set("k", json!(1), Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = InMemoryQueryCache::new();
        cache.set("a", json!(1), Duration::from_secs(1)).await.unwrap();
        cache.set("b", json!(2), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let cache = InMemoryQueryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("GetUser:1", json!(1), ttl).await.unwrap();
        cache.set("GetUser:2", json!(2), ttl).await.unwrap();
        cache.set("ListOrders:1", json!(3), ttl).await.unwrap();

        assert!(cache.supports_prefix_delete());
        assert_eq!(cache.delete_prefix("GetUser:").await.unwrap(), 2);
        assert!(cache.get("ListOrders:1").await.unwrap().is_some());
    }
}
