//! Client defaults and per-query options

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Client-wide defaults, used wherever a [`QueryOptions`] field is unset
#[derive(Debug, Clone, PartialEq)]
pub struct SwrConfig {
    /// How long a stored value may be served at all
    pub cache_time: Duration,

    /// Age after which a served value triggers a background refresh
    pub stale_time: Duration,

    pub enable_background_refresh: bool,

    /// Period of the per-key refresh timer; zero disables the timer
    pub refresh_interval: Duration,

    /// Share one fetch between concurrent callers of the same key
    pub dedupe_concurrent: bool,

    /// Extra attempts after the first failure
    pub retry: u32,

    pub retry_delay: Duration,
}

impl Default for SwrConfig {
    fn default() -> Self {
        Self {
            cache_time: Duration::from_secs(300),
            stale_time: Duration::ZERO,
            enable_background_refresh: false,
            refresh_interval: Duration::ZERO,
            dedupe_concurrent: true,
            retry: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Per-call options
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use switchyard_swr::QueryOptions;
///
/// let options = QueryOptions::new()
///     .cache_time(Duration::from_secs(60))
///     .stale_time(Duration::from_secs(10))
///     .background_refresh(true)
///     .retry(0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub cache_time: Option<Duration>,
    pub stale_time: Option<Duration>,
    pub enable_background_refresh: Option<bool>,
    pub refresh_interval: Option<Duration>,
    pub dedupe_concurrent: Option<bool>,
    pub retry: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub abort: Option<CancellationToken>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time);
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn background_refresh(mut self, enabled: bool) -> Self {
        self.enable_background_refresh = Some(enabled);
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_concurrent = Some(enabled);
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Cancel the call when `token` fires
    pub fn abort_signal(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub(crate) fn resolve(self, config: &SwrConfig) -> ResolvedOptions {
        ResolvedOptions {
            cache_time: self.cache_time.unwrap_or(config.cache_time),
            stale_time: self.stale_time.unwrap_or(config.stale_time),
            enable_background_refresh: self
                .enable_background_refresh
                .unwrap_or(config.enable_background_refresh),
            refresh_interval: self.refresh_interval.unwrap_or(config.refresh_interval),
            dedupe_concurrent: self.dedupe_concurrent.unwrap_or(config.dedupe_concurrent),
            retry: self.retry.unwrap_or(config.retry),
            retry_delay: self.retry_delay.unwrap_or(config.retry_delay),
            abort: self.abort,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedOptions {
    pub cache_time: Duration,
    pub stale_time: Duration,
    pub enable_background_refresh: bool,
    pub refresh_interval: Duration,
    pub dedupe_concurrent: bool,
    pub retry: u32,
    pub retry_delay: Duration,
    pub abort: Option<CancellationToken>,
}

impl ResolvedOptions {
    pub(crate) fn schedules_refresh(&self) -> bool {
        self.enable_background_refresh
            && !self.refresh_interval.is_zero()
            && !self.cache_time.is_zero()
    }
}
