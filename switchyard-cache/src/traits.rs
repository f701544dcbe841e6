//! Query cache adapter trait definition.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Backing store consulted by the query bus before invoking a handler.
///
/// Adapters are supplied by the application. Every method may fail; the
/// query bus treats any failure as a cache miss, so an adapter outage never
/// changes query results.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Get a value from the cache.
    ///
    /// Returns `Ok(Some(value))` if the key exists and has not expired,
    /// `Ok(None)` if not found.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store a value for `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()>;

    /// Delete a key from the cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Whether [`QueryCache::delete_prefix`] is implemented.
    ///
    /// Callers check this before attempting bulk invalidation.
    fn supports_prefix_delete(&self) -> bool {
        false
    }

    /// Delete every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, _prefix: &str) -> CacheResult<usize> {
        Err(CacheError::Unsupported("delete_prefix"))
    }

    /// Adapter name used in log output.
    fn name(&self) -> &str {
        "query-cache"
    }
}
