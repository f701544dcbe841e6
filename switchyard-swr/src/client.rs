//! Stale-while-revalidate client
//!
//! Every fetch runs in its own Tokio task, so it settles (and cleans up its
//! in-flight entry) even when every caller waiting on it has gone away.
//! State lives behind one short-lived mutex that is never held across an
//! `.await`.

use crate::error::SwrError;
use crate::key::QueryKey;
use crate::options::{QueryOptions, ResolvedOptions, SwrConfig};
use crate::result::QueryResult;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, SwrError>> + Send + Sync>;
type FetchOutcome<T> = Result<T, Arc<SwrError>>;
type SharedFetch<T> = Shared<BoxFuture<'static, FetchOutcome<T>>>;

struct CacheEntry<T> {
    key: QueryKey,
    value: T,
    stored_at: Instant,
    cache_time: Duration,
    stale_time: Duration,
}

impl<T> CacheEntry<T> {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    /// Expired with respect to the window it was stored with
    fn is_expired(&self, now: Instant) -> bool {
        self.age(now) >= self.cache_time
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.age(now) >= self.stale_time
    }
}

struct InFlight<T> {
    id: u64,
    background: bool,
    fetch: SharedFetch<T>,
}

struct State<T> {
    entries: HashMap<String, CacheEntry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl<T> State<T> {
    fn cancel_timer(&mut self, cache_key: &str) {
        if let Some(timer) = self.timers.remove(cache_key) {
            timer.abort();
        }
    }

    fn cancel_all_timers(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    config: SwrConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    next_fetch_id: AtomicU64,
    /// Bumped by `dispose`; fetches from an older generation store nothing
    generation: AtomicU64,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.state.get_mut().cancel_all_timers();
    }
}

/// Snapshot returned by [`SwrClient::get_cache_stats`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Entries still inside their cache window
    pub cached_queries: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before the first query
    pub hit_rate: f64,
}

enum Plan<T> {
    Cached(T),
    Await(SharedFetch<T>),
}

/// Stale-while-revalidate query client
///
/// Cloning is cheap; clones share one cache. Dropping the last clone (or
/// calling [`SwrClient::dispose`]) cancels every refresh timer.
///
/// # Examples
///
/// ```rust,ignore
/// use switchyard_swr::*;
///
/// let client: SwrClient<User> = SwrClient::new();
///
/// let result = client
///     .query(query_key!["users", 42], || fetch_user(42), QueryOptions::new())
///     .await;
///
/// if let Some(user) = result.data {
///     println!("{} (cached: {})", user.name, result.is_from_cache);
/// }
/// ```
pub struct SwrClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SwrClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> SwrClient<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a client with default settings
    pub fn new() -> Self {
        Self::with_config(SwrConfig::default())
    }

    pub fn with_config(config: SwrConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    in_flight: HashMap::new(),
                    timers: HashMap::new(),
                }),
                config,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                next_fetch_id: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SwrConfig {
        &self.inner.config
    }

    /// Run a query through the cache.
    ///
    /// Freshness is judged against this call's `cache_time` and
    /// `stale_time`. Must be called from within a Tokio runtime.
    pub async fn query<F, Fut, E>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: QueryOptions,
    ) -> QueryResult<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = key.into();
        let options = options.resolve(&self.inner.config);
        let fetcher = into_fetcher(query_fn);

        match self.inner.plan(&key, &fetcher, &options) {
            Plan::Cached(value) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                trace!(query.key = %key, "SWR cache hit");
                QueryResult::cached(value)
            }
            Plan::Await(fetch) => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                match await_fetch(fetch, options.abort.as_ref()).await {
                    Ok(value) => QueryResult::fetched(value),
                    Err(error) => QueryResult::failed(error),
                }
            }
        }
    }

    /// Like [`SwrClient::query`], projecting the data with `select`.
    ///
    /// The cache keeps the unprojected value.
    pub async fn query_select<U, S, F, Fut, E>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: QueryOptions,
        select: S,
    ) -> QueryResult<U>
    where
        S: FnOnce(&T) -> U,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.query(key, query_fn, options)
            .await
            .map(|value| select(&value))
    }

    /// Fetch into the cache unless a servable value is already there.
    ///
    /// Does not count towards the cache stats.
    pub async fn prefetch_query<F, Fut, E>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: QueryOptions,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let key = key.into();
        let options = options.resolve(&self.inner.config);
        let fetcher = into_fetcher(query_fn);

        if let Plan::Await(fetch) = self.inner.plan(&key, &fetcher, &options) {
            if let Err(e) = await_fetch(fetch, options.abort.as_ref()).await {
                debug!(query.key = %key, error = %e, "Prefetch failed");
            }
        }
    }

    /// Peek at the cache without fetching
    ///
    /// Expiry here uses the cache window the entry was stored with, while
    /// [`SwrClient::query`] judges the same entry against the caller's
    /// `cache_time`. A value stored with a short window can therefore be
    /// `None` here and still be served by a `query` with a longer one.
    pub fn get_query_data(&self, key: impl Into<QueryKey>) -> Option<T> {
        let cache_key = key.into().canonical();
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .entries
            .get(&cache_key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Whether the cached value for `key` has passed the stale time it was
    /// stored with. Absent or expired entries count as stale.
    pub fn is_stale(&self, key: impl Into<QueryKey>) -> bool {
        let cache_key = key.into().canonical();
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .entries
            .get(&cache_key)
            .is_none_or(|entry| entry.is_expired(now) || entry.is_stale(now))
    }

    /// Store a value directly, using the client's default cache window
    pub fn set_query_data(&self, key: impl Into<QueryKey>, value: T) {
        let key = key.into();
        let config = &self.inner.config;
        if config.cache_time.is_zero() {
            debug!(query.key = %key, "Cache time is zero; value not stored");
            return;
        }
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: Instant::now(),
            cache_time: config.cache_time,
            stale_time: config.stale_time,
        };
        self.inner.state.lock().entries.insert(key.canonical(), entry);
    }

    /// Drop the cached value and refresh timer for a key.
    ///
    /// A fetch already in flight is left to finish.
    pub fn invalidate_queries(&self, key: impl Into<QueryKey>) -> bool {
        let key = key.into();
        let cache_key = key.canonical();
        let mut state = self.inner.state.lock();
        state.cancel_timer(&cache_key);
        let removed = state.entries.remove(&cache_key).is_some();
        debug!(query.key = %key, removed, "Invalidated query");
        removed
    }

    /// Remove every entry whose key starts with the parts of `prefix`
    pub fn remove_all(&self, prefix: impl Into<QueryKey>) -> usize {
        let prefix = prefix.into();
        let mut state = self.inner.state.lock();
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.key.parts().starts_with(prefix.parts()))
            .map(|(cache_key, _)| cache_key.clone())
            .collect();
        for cache_key in &doomed {
            state.entries.remove(cache_key);
            state.cancel_timer(cache_key);
        }
        doomed.len()
    }

    /// Remove every entry and refresh timer
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.cancel_all_timers();
    }

    /// Physically evict entries past their cache window, with their timers
    pub fn garbage_collect(&self) -> usize {
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(cache_key, _)| cache_key.clone())
            .collect();
        for cache_key in &expired {
            state.entries.remove(cache_key);
            state.cancel_timer(cache_key);
        }
        if !expired.is_empty() {
            debug!(evicted = expired.len(), "Evicted expired queries");
        }
        expired.len()
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let now = Instant::now();
        let cached_queries = self
            .inner
            .state
            .lock()
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count();
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            cached_queries,
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Fetches currently registered for deduplication
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn is_fetching(&self, key: impl Into<QueryKey>) -> bool {
        let cache_key = key.into().canonical();
        self.inner.state.lock().in_flight.contains_key(&cache_key)
    }

    /// Cancel all refresh timers and forget all state.
    ///
    /// Fetches already running still settle for their callers, but they no
    /// longer write to the cache or start refresh timers.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        state.cancel_all_timers();
        state.entries.clear();
        state.in_flight.clear();
        debug!("SWR client disposed");
    }
}

impl<T> Default for SwrClient<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Decide how to serve a call; starts fetches as needed.
    fn plan(
        self: &Arc<Self>,
        key: &QueryKey,
        fetcher: &Fetcher<T>,
        options: &ResolvedOptions,
    ) -> Plan<T> {
        let cache_key = key.canonical();
        let now = Instant::now();
        let mut state = self.state.lock();

        let servable = state
            .entries
            .get(&cache_key)
            .map(|entry| (entry.value.clone(), entry.age(now)))
            .filter(|(_, age)| *age < options.cache_time);

        let in_flight = state
            .in_flight
            .get(&cache_key)
            .map(|f| (f.background, f.fetch.clone()));

        if let Some((background, fetch)) = &in_flight {
            // A refresh never blocks a caller that has something to serve
            if *background {
                if let Some((value, _)) = servable {
                    return Plan::Cached(value);
                }
            }
            if options.dedupe_concurrent {
                trace!(query.key = %key, "Joining in-flight fetch");
                return Plan::Await(fetch.clone());
            }
        }

        if let Some((value, age)) = servable {
            let refreshing = in_flight.is_some();
            if options.enable_background_refresh && age >= options.stale_time && !refreshing {
                debug!(
                    query.key = %key,
                    age.ms = age.as_millis() as u64,
                    "Serving stale value, refreshing in background"
                );
                let refresh = ResolvedOptions {
                    abort: None,
                    ..options.clone()
                };
                self.start_fetch(&mut state, key, fetcher.clone(), refresh, true);
            }
            return Plan::Cached(value);
        }

        Plan::Await(self.start_fetch(&mut state, key, fetcher.clone(), options.clone(), false))
    }

    fn start_fetch(
        self: &Arc<Self>,
        state: &mut State<T>,
        key: &QueryKey,
        fetcher: Fetcher<T>,
        options: ResolvedOptions,
        background: bool,
    ) -> SharedFetch<T> {
        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let cache_key = key.canonical();
        // Background refreshes are always registered so one key never has
        // two of them running
        let registered = options.dedupe_concurrent || background;
        let generation = self.generation.load(Ordering::SeqCst);

        debug!(query.key = %key, fetch.id = id, background, "Starting fetch");

        let task = tokio::spawn(self.clone().run_fetch(
            id,
            key.clone(),
            fetcher,
            options,
            registered,
            generation,
        ));
        let fetch = async move {
            task.await
                .unwrap_or_else(|e| Err(Arc::new(SwrError::TaskFailed(e.to_string()))))
        }
        .boxed()
        .shared();

        // The task cannot settle before this insert: settling takes the lock
        // held by the caller.
        if registered {
            state.in_flight.insert(
                cache_key,
                InFlight {
                    id,
                    background,
                    fetch: fetch.clone(),
                },
            );
        }

        fetch
    }

    async fn run_fetch(
        self: Arc<Self>,
        id: u64,
        key: QueryKey,
        fetcher: Fetcher<T>,
        options: ResolvedOptions,
        registered: bool,
        generation: u64,
    ) -> FetchOutcome<T> {
        let outcome = fetch_with_retry(&fetcher, &options, &key)
            .await
            .map_err(Arc::new);
        let cache_key = key.canonical();

        let mut state = self.state.lock();
        if registered && state.in_flight.get(&cache_key).is_some_and(|f| f.id == id) {
            state.in_flight.remove(&cache_key);
        }

        let current = self.generation.load(Ordering::SeqCst) == generation;

        match &outcome {
            Ok(_) if !current => {
                debug!(query.key = %key, fetch.id = id, "Client disposed; result not cached");
            }
            Ok(value) if !options.cache_time.is_zero() => {
                state.entries.insert(
                    cache_key.clone(),
                    CacheEntry {
                        key: key.clone(),
                        value: value.clone(),
                        stored_at: Instant::now(),
                        cache_time: options.cache_time,
                        stale_time: options.stale_time,
                    },
                );
                if options.schedules_refresh() && !state.timers.contains_key(&cache_key) {
                    let timer = self.spawn_refresh_timer(key, fetcher, options);
                    state.timers.insert(cache_key, timer);
                }
            }
            Ok(_) => {}
            Err(e) => debug!(query.key = %key, fetch.id = id, error = %e, "Fetch failed"),
        }
        drop(state);

        outcome
    }

    fn spawn_refresh_timer(
        self: &Arc<Self>,
        key: QueryKey,
        fetcher: Fetcher<T>,
        options: ResolvedOptions,
    ) -> JoinHandle<()> {
        let inner: Weak<Self> = Arc::downgrade(self);
        let period = options.refresh_interval;
        let options = ResolvedOptions {
            abort: None,
            ..options
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.refresh(&key, &fetcher, &options);
            }
        })
    }

    /// Timer-driven refresh; skipped while a fetch for the key is running
    fn refresh(self: &Arc<Self>, key: &QueryKey, fetcher: &Fetcher<T>, options: &ResolvedOptions) {
        let mut state = self.state.lock();
        if state.in_flight.contains_key(&key.canonical()) {
            return;
        }
        trace!(query.key = %key, "Background refresh tick");
        // Settles on its own; nobody awaits a timer refresh
        let _ = self.start_fetch(&mut state, key, fetcher.clone(), options.clone(), true);
    }
}

fn into_fetcher<T, F, Fut, E>(query_fn: F) -> Fetcher<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let query_fn = Arc::new(query_fn);
    Arc::new(move || {
        let query_fn = query_fn.clone();
        async move {
            query_fn()
                .await
                .map_err(|e| SwrError::Fetch(e.to_string()))
        }
        .boxed()
    })
}

async fn await_fetch<T: Clone>(
    fetch: SharedFetch<T>,
    abort: Option<&CancellationToken>,
) -> FetchOutcome<T> {
    match abort {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Arc::new(SwrError::Aborted)),
            outcome = fetch => outcome,
        },
        None => fetch.await,
    }
}

async fn fetch_with_retry<T>(
    fetcher: &Fetcher<T>,
    options: &ResolvedOptions,
    key: &QueryKey,
) -> Result<T, SwrError> {
    let mut attempt = 0;
    loop {
        let call = AssertUnwindSafe(fetcher())
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|panic| Err(SwrError::Panicked(panic_message(panic)))));

        let result = match &options.abort {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SwrError::Aborted),
                result = call => result,
            },
            None => call.await,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) if attempt < options.retry => error,
            Err(error) => return Err(error),
        };

        attempt += 1;
        warn!(query.key = %key, attempt, error = %error, "Query failed, retrying");

        match &options.abort {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SwrError::Aborted),
                _ = tokio::time::sleep(options.retry_delay) => {}
            },
            None => tokio::time::sleep(options.retry_delay).await,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
