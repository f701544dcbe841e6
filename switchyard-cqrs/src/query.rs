//! Query handling for CQRS

use crate::error::{CqrsError, HandlerError, describe_panic};
use crate::message::{Query, QueryMessage};
use crate::observer::{ExecutionContext, ExecutionKind, ExecutionObserver, Observers};
use crate::registry::ExecutionRegistry;
use crate::result::ExecutionResult;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_cache::QueryCache;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Query handler trait
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Handle the query
    async fn handle(&self, query: &Query) -> Result<Value, HandlerError>;
}

/// Handler for a typed [`QueryMessage`]
#[async_trait]
pub trait HandleQuery<Q: QueryMessage>: Send + Sync {
    async fn handle(&self, query: Q) -> Result<Q::Output, HandlerError>;
}

/// Wrapper for typed query handlers
pub struct TypedQueryHandler<Q: QueryMessage, H: HandleQuery<Q>> {
    handler: H,
    _phantom: PhantomData<fn() -> Q>,
}

impl<Q: QueryMessage, H: HandleQuery<Q>> TypedQueryHandler<Q, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<Q: QueryMessage, H: HandleQuery<Q>> QueryHandler for TypedQueryHandler<Q, H> {
    async fn handle(&self, query: &Query) -> Result<Value, HandlerError> {
        let message: Q = query.payload_as()?;
        let output = self.handler.handle(message).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Default lifetime of a cached query result
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(300);

/// Query bus
///
/// Caching is optional: without an adapter every call reaches the handler.
#[derive(Clone)]
pub struct QueryBus {
    registry: Arc<ExecutionRegistry<dyn QueryHandler>>,
    cache: Arc<RwLock<Option<Arc<dyn QueryCache>>>>,
    observers: Observers,
    default_cache_time: Duration,
}

impl QueryBus {
    /// Create new query bus
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ExecutionRegistry::new()),
            cache: Arc::new(RwLock::new(None)),
            observers: Observers::default(),
            default_cache_time: DEFAULT_CACHE_TIME,
        }
    }

    /// Set the cache lifetime used when neither the caller nor the query gives one
    pub fn with_default_cache_time(mut self, cache_time: Duration) -> Self {
        self.default_cache_time = cache_time;
        self
    }

    pub fn default_cache_time(&self) -> Duration {
        self.default_cache_time
    }

    /// Register a query handler for a type name (last registration wins)
    pub fn register<H>(&self, query_type: impl Into<String>, handler: H)
    where
        H: QueryHandler + 'static,
    {
        self.registry.register(query_type, Arc::new(handler));
    }

    /// Register a handler for a typed query message
    pub fn register_typed<Q, H>(&self, handler: H)
    where
        Q: QueryMessage,
        H: HandleQuery<Q> + 'static,
    {
        self.register(Q::TYPE, TypedQueryHandler::<Q, H>::new(handler));
    }

    pub fn registry(&self) -> &ExecutionRegistry<dyn QueryHandler> {
        &self.registry
    }

    pub fn add_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.add(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Install or replace the cache adapter
    pub fn set_query_cache(&self, cache: Arc<dyn QueryCache>) {
        debug!(adapter = cache.name(), "Query cache adapter installed");
        *self.cache.write() = Some(cache);
    }

    /// Remove the cache adapter; later calls always reach the handler
    pub fn clear_query_cache(&self) {
        *self.cache.write() = None;
    }

    pub fn has_query_cache(&self) -> bool {
        self.cache.read().is_some()
    }

    fn cache_snapshot(&self) -> Option<Arc<dyn QueryCache>> {
        self.cache.read().clone()
    }

    /// Execute a query without consulting the cache
    pub async fn execute(&self, query: Query) -> ExecutionResult {
        let query_type = query.query_type().to_string();

        let Some(handler) = self.registry.resolve(&query_type) else {
            warn!(query.type = %query_type, "No handler registered for query");
            return ExecutionResult::failure(format!(
                "No handler registered for query: {}",
                query_type
            ));
        };

        let ctx = ExecutionContext {
            kind: ExecutionKind::Query,
            message_type: &query_type,
            message_id: query.id(),
        };
        self.observers.notify_start(&ctx);
        let started = Instant::now();

        let outcome = AssertUnwindSafe(handler.handle(&query)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(data)) => ExecutionResult::success(data),
            Ok(Err(e)) => ExecutionResult::failure(e.to_string()),
            Err(panic) => ExecutionResult::failure(describe_panic(panic)),
        };

        self.observers
            .notify_finish(&ctx, &result, started.elapsed());

        if !result.success {
            error!(
                query.type = %query_type,
                error = result.error_message().unwrap_or_default(),
                "Query execution failed"
            );
        }

        result
    }

    /// Execute a query through the cache adapter.
    ///
    /// The key falls back from `cache_key` to the query's own hint and then
    /// to the canonical JSON of its payload; the lifetime falls back from
    /// `cache_time` to the query's hint and then to the bus default. A zero
    /// lifetime disables the write. Adapter failures degrade to a miss.
    pub async fn execute_with_cache(
        &self,
        query: Query,
        cache_key: Option<&str>,
        cache_time: Option<Duration>,
    ) -> ExecutionResult {
        let Some(cache) = self.cache_snapshot() else {
            return self.execute(query).await;
        };

        let key = self.cache_key_for(&query, cache_key);
        let ttl = cache_time
            .or(query.cache_time())
            .unwrap_or(self.default_cache_time);

        match cache.get(&key).await {
            Ok(Some(data)) => {
                debug!(cache.key = %key, "Query cache hit");
                return ExecutionResult::cached(data);
            }
            Ok(None) => debug!(cache.key = %key, "Query cache miss"),
            Err(e) => warn!(cache.key = %key, error = %e, "Query cache read failed, invoking handler"),
        }

        let result = self.execute(query).await;

        if result.success && !ttl.is_zero() {
            if let Some(data) = &result.data {
                if let Err(e) = cache.set(&key, data.clone(), ttl).await {
                    warn!(cache.key = %key, error = %e, "Query cache write failed");
                }
            }
        }

        result
    }

    /// Namespaced storage key: `"<query_type>:<key>"`
    pub fn cache_key_for(&self, query: &Query, cache_key: Option<&str>) -> String {
        let key = match cache_key.or(query.cache_key()) {
            Some(key) => key.to_string(),
            None => query.payload().to_string(),
        };
        format!("{}:{}", query.query_type(), key)
    }

    /// Warm the cache in the background.
    ///
    /// The result is discarded; await the handle to know when it is stored.
    pub fn prefetch(&self, query: Query) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            let query_type = query.query_type().to_string();
            let result = bus.execute_with_cache(query, None, None).await;
            if !result.success {
                debug!(query.type = %query_type, "Prefetch did not populate the cache");
            }
        })
    }

    /// Drop cached results for a query type.
    ///
    /// With a key only that entry is removed. Without one, every entry of the
    /// type is removed if the adapter supports prefix deletion; otherwise
    /// nothing happens.
    pub async fn invalidate_cache(&self, query_type: &str, cache_key: Option<&str>) {
        let Some(cache) = self.cache_snapshot() else {
            return;
        };

        match cache_key {
            Some(key) => {
                let key = format!("{}:{}", query_type, key);
                if let Err(e) = cache.delete(&key).await {
                    warn!(cache.key = %key, error = %e, "Query cache delete failed");
                }
            }
            None if cache.supports_prefix_delete() => {
                let prefix = format!("{}:", query_type);
                match cache.delete_prefix(&prefix).await {
                    Ok(removed) => debug!(query.type = query_type, removed, "Invalidated cached queries"),
                    Err(e) => warn!(query.type = query_type, error = %e, "Query cache prefix delete failed"),
                }
            }
            None => {
                warn!(
                    query.type = query_type,
                    adapter = cache.name(),
                    "Cache adapter cannot delete by prefix; invalidation skipped"
                );
            }
        }
    }

    /// Dispatch a typed query and decode its output
    pub async fn dispatch<Q: QueryMessage>(&self, message: &Q) -> Result<Q::Output, CqrsError> {
        if !self.registry.contains(Q::TYPE) {
            return Err(CqrsError::HandlerNotFound(Q::TYPE.to_string()));
        }
        let query =
            Query::from_message(message).map_err(|e| CqrsError::Serialization(e.to_string()))?;
        self.execute(query).await.into_typed()
    }

    /// Like [`QueryBus::dispatch`], through the cache
    pub async fn dispatch_cached<Q: QueryMessage>(
        &self,
        message: &Q,
    ) -> Result<Q::Output, CqrsError> {
        if !self.registry.contains(Q::TYPE) {
            return Err(CqrsError::HandlerNotFound(Q::TYPE.to_string()));
        }
        let query =
            Query::from_message(message).map_err(|e| CqrsError::Serialization(e.to_string()))?;
        self.execute_with_cache(query, None, None)
            .await
            .into_typed()
    }
}

impl Default for QueryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_cache::{CacheError, CacheResult, InMemoryQueryCache};

    #[derive(Serialize, Deserialize)]
    struct GetUserQuery {
        user_id: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        email: String,
    }

    impl QueryMessage for GetUserQuery {
        const TYPE: &'static str = "GetUser";
        type Output = User;
    }

    struct GetUserHandler;

    #[async_trait]
    impl HandleQuery<GetUserQuery> for GetUserHandler {
        async fn handle(&self, query: GetUserQuery) -> Result<User, HandlerError> {
            Ok(User {
                id: query.user_id,
                email: "alice@example.com".to_string(),
            })
        }
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryHandler for CountingHandler {
        async fn handle(&self, _query: &Query) -> Result<Value, HandlerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "v": n }))
        }
    }

    fn counting_bus() -> (QueryBus, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let bus = QueryBus::new();
        bus.register("Count", CountingHandler { calls: calls.clone() });
        (bus, calls)
    }

    #[tokio::test]
    async fn test_query_bus() {
        let bus = QueryBus::new();
        bus.register_typed::<GetUserQuery, _>(GetUserHandler);
        bus.add_observer(Arc::new(crate::observer::TracingObserver));
        assert_eq!(bus.observer_count(), 1);

        let query = GetUserQuery {
            user_id: "123".to_string(),
        };

        let user = bus.dispatch(&query).await.unwrap();
        assert_eq!(user.id, "123");
        assert_eq!(user.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_missing_handler_is_failure_result() {
        let bus = QueryBus::new();
        let result = bus.execute(Query::new("Nope", json!({}))).await;
        assert_eq!(
            result.error_message(),
            Some("No handler registered for query: Nope")
        );
    }

    #[tokio::test]
    async fn test_without_adapter_always_invokes_handler() {
        let (bus, calls) = counting_bus();
        for _ in 0..2 {
            let result = bus
                .execute_with_cache(Query::new("Count", json!({})), Some("k"), None)
                .await;
            assert!(!result.from_cache);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_handler() {
        let (bus, calls) = counting_bus();
        bus.set_query_cache(Arc::new(InMemoryQueryCache::new()));

        let first = bus
            .execute_with_cache(Query::new("Count", json!({"id": 1})), None, None)
            .await;
        let second = bus
            .execute_with_cache(Query::new("Count", json!({"id": 1})), None, None)
            .await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.data, Some(json!({"v": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_cache_time_does_not_store() {
        let (bus, calls) = counting_bus();
        bus.set_query_cache(Arc::new(InMemoryQueryCache::new()));

        for _ in 0..2 {
            bus.execute_with_cache(Query::new("Count", json!({})), None, Some(Duration::ZERO))
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_key_resolution() {
        let bus = QueryBus::new();
        let query = Query::new("GetUser", json!({"id": 7}));
        assert_eq!(bus.cache_key_for(&query, None), r#"GetUser:{"id":7}"#);
        assert_eq!(bus.cache_key_for(&query, Some("u7")), "GetUser:u7");

        let hinted = query.with_cache_key("hint");
        assert_eq!(bus.cache_key_for(&hinted, None), "GetUser:hint");
        assert_eq!(bus.cache_key_for(&hinted, Some("arg")), "GetUser:arg");
    }

    #[tokio::test]
    async fn test_invalidate_by_key_and_type() {
        let (bus, calls) = counting_bus();
        let cache = InMemoryQueryCache::new();
        bus.set_query_cache(Arc::new(cache.clone()));

        bus.execute_with_cache(Query::new("Count", json!({})), Some("a"), None)
            .await;
        bus.execute_with_cache(Query::new("Count", json!({})), Some("b"), None)
            .await;
        assert_eq!(cache.len(), 2);

        bus.invalidate_cache("Count", Some("a")).await;
        assert_eq!(cache.len(), 1);

        bus.invalidate_cache("Count", None).await;
        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prefetch_warms_cache() {
        let (bus, calls) = counting_bus();
        bus.set_query_cache(Arc::new(InMemoryQueryCache::new()));

        bus.prefetch(Query::new("Count", json!({})).with_cache_key("warm"))
            .await
            .unwrap();

        let result = bus
            .execute_with_cache(Query::new("Count", json!({})), Some("warm"), None)
            .await;
        assert!(result.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_query_cache() {
        let (bus, calls) = counting_bus();
        bus.set_query_cache(Arc::new(InMemoryQueryCache::new()));
        assert!(bus.has_query_cache());

        bus.execute_with_cache(Query::new("Count", json!({})), Some("k"), None)
            .await;
        bus.clear_query_cache();
        assert!(!bus.has_query_cache());

        let result = bus
            .execute_with_cache(Query::new("Count", json!({})), Some("k"), None)
            .await;
        assert!(!result.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Adapter whose backend is always unreachable
    struct UnreachableCache {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryCache for UnreachableCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Value>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Connection("refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> CacheResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Timeout)
        }

        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Connection("refused".to_string()))
        }
    }

    /// Adapter with exact-key deletes only
    #[derive(Default)]
    struct ExactKeyCache {
        data: parking_lot::Mutex<std::collections::HashMap<String, Value>>,
    }

    #[async_trait]
    impl QueryCache for ExactKeyCache {
        async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
            Ok(self.data.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Value, _ttl: Duration) -> CacheResult<()> {
            self.data.lock().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.data.lock().remove(key);
            Ok(())
        }

        fn name(&self) -> &str {
            "exact-key"
        }
    }

    #[tokio::test]
    async fn test_adapter_errors_fall_back_to_handler() {
        let (bus, calls) = counting_bus();
        let attempts = Arc::new(AtomicUsize::new(0));
        bus.set_query_cache(Arc::new(UnreachableCache {
            attempts: attempts.clone(),
        }));

        for expected in 1..=2 {
            let result = bus
                .execute_with_cache(Query::new("Count", json!({})), Some("k"), None)
                .await;
            assert!(result.success);
            assert!(!result.from_cache);
            assert_eq!(result.data, Some(json!({ "v": expected })));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // one read and one write per call
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        bus.invalidate_cache("Count", Some("k")).await;
    }

    #[tokio::test]
    async fn test_type_invalidation_skipped_without_prefix_support() {
        let (bus, calls) = counting_bus();
        let cache = Arc::new(ExactKeyCache::default());
        bus.set_query_cache(cache.clone());

        bus.execute_with_cache(Query::new("Count", json!({})), Some("a"), None)
            .await;
        bus.execute_with_cache(Query::new("Count", json!({})), Some("b"), None)
            .await;

        bus.invalidate_cache("Count", None).await;
        assert_eq!(cache.data.lock().len(), 2);

        let result = bus
            .execute_with_cache(Query::new("Count", json!({})), Some("a"), None)
            .await;
        assert!(result.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        bus.invalidate_cache("Count", Some("a")).await;
        assert!(!cache.data.lock().contains_key("Count:a"));
        assert!(cache.data.lock().contains_key("Count:b"));
    }
}
