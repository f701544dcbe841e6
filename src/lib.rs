//! Switchyard: in-process dispatch with a stale-while-revalidate query cache
//!
//! The [`Switchyard`] facade wires the workspace crates together:
//!
//! - a [`CommandBus`] with middleware and async status tracking
//! - a [`QueryBus`] with an optional [`QueryCache`] adapter
//! - an [`EventBus`] that fans events out to handlers
//! - an [`SwrClient`] that can sit in front of the query bus
//!
//! ```no_run
//! use serde_json::json;
//! use switchyard::prelude::*;
//!
//! # async fn run() -> Result<(), SwitchyardError> {
//! let config = ConfigManager::builder().load_env().build()?;
//! let settings = SwitchyardSettings::load(&config)?;
//! let _guard = switchyard::init_logging(&settings)?;
//!
//! let yard = Switchyard::from_settings(&settings);
//! let result = yard
//!     .swr_query(query_key!["user", 1], Query::new("GetUser", json!({"id": 1})), QueryOptions::new())
//!     .await;
//! # yard.shutdown();
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub use switchyard_cache as cache;
pub use switchyard_config as config;
pub use switchyard_cqrs as cqrs;
pub use switchyard_events as events;
pub use switchyard_log as logging;
pub use switchyard_swr as swr;

use switchyard_cache::QueryCache;
use switchyard_config::{ConfigError, SwitchyardSettings};
use switchyard_cqrs::{CommandBus, Query, QueryBus};
use switchyard_events::{EventBus, EventBusConfig};
use switchyard_log::{LogConfig, LogError};
use switchyard_swr::{QueryKey, QueryOptions, QueryResult, SwrClient, SwrConfig};

pub use switchyard_log::WorkerGuard;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Install the global log subscriber described by `settings.log`
pub fn init_logging(settings: &SwitchyardSettings) -> Result<WorkerGuard, SwitchyardError> {
    let guard = LogConfig::from_names(&settings.log.level, &settings.log.format)?.init()?;
    Ok(guard)
}

/// The wired set of buses
///
/// Cloning is cheap and every clone shares the same handlers, caches and
/// status records.
#[derive(Clone)]
pub struct Switchyard {
    commands: CommandBus,
    queries: QueryBus,
    events: EventBus,
    swr: SwrClient<Value>,
}

impl Switchyard {
    pub fn builder() -> SwitchyardBuilder {
        SwitchyardBuilder::default()
    }

    /// Build from loaded settings; starts the command status sweep
    pub fn from_settings(settings: &SwitchyardSettings) -> Self {
        Self::builder().settings(settings).build()
    }

    /// Load settings from `SWITCHYARD_*` environment variables and build
    pub fn from_env() -> Result<Self, SwitchyardError> {
        let config = switchyard_config::ConfigManager::builder()
            .load_env()
            .build()?;
        let settings = SwitchyardSettings::load(&config)?;
        Ok(Self::from_settings(&settings))
    }

    pub fn command_bus(&self) -> &CommandBus {
        &self.commands
    }

    pub fn query_bus(&self) -> &QueryBus {
        &self.queries
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn swr(&self) -> &SwrClient<Value> {
        &self.swr
    }

    /// Run `query` through the SWR client, fetching from the query bus
    ///
    /// The query bus is called with [`QueryBus::execute`]; caching here is
    /// the SWR client's. A failed execution becomes a failed result carrying
    /// the bus's error message.
    pub async fn swr_query(
        &self,
        key: impl Into<QueryKey>,
        query: Query,
        options: QueryOptions,
    ) -> QueryResult<Value> {
        let bus = self.queries.clone();
        self.swr
            .query(
                key,
                move || {
                    let bus = bus.clone();
                    let query = query.clone();
                    async move { bus.execute(query).await.into_result() }
                },
                options,
            )
            .await
    }

    /// Stop the status sweep and every SWR refresh timer
    pub fn shutdown(&self) {
        self.commands.shutdown();
        self.swr.dispose();
        info!("Switchyard shut down");
    }
}

/// Builder for [`Switchyard`]
#[derive(Default)]
pub struct SwitchyardBuilder {
    status_sweep: Option<(Duration, Duration)>,
    default_cache_time: Option<Duration>,
    query_cache: Option<Arc<dyn QueryCache>>,
    events: EventBusConfig,
    swr: SwrConfig,
}

impl SwitchyardBuilder {
    /// Take every section from `settings`
    pub fn settings(self, settings: &SwitchyardSettings) -> Self {
        self.status_sweep(
            settings.command.status_sweep_interval(),
            settings.command.status_retention(),
        )
        .default_cache_time(settings.query.default_cache_time())
        .event_config(EventBusConfig {
            async_handling: settings.events.async_handling,
            enable_logging: settings.events.enable_logging,
        })
        .swr_config(swr_config(settings))
    }

    /// Periodically drop finished command statuses older than `retention`
    pub fn status_sweep(mut self, interval: Duration, retention: Duration) -> Self {
        self.status_sweep = Some((interval, retention));
        self
    }

    pub fn default_cache_time(mut self, cache_time: Duration) -> Self {
        self.default_cache_time = Some(cache_time);
        self
    }

    pub fn query_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.query_cache = Some(cache);
        self
    }

    pub fn event_config(mut self, config: EventBusConfig) -> Self {
        self.events = config;
        self
    }

    pub fn swr_config(mut self, config: SwrConfig) -> Self {
        self.swr = config;
        self
    }

    /// Build the facade
    ///
    /// Starting the status sweep spawns a task, so a sweep requires a Tokio
    /// runtime.
    pub fn build(self) -> Switchyard {
        let commands = CommandBus::new();
        if let Some((interval, retention)) = self.status_sweep {
            commands.start_status_sweep(interval, retention);
        }

        let mut queries = QueryBus::new();
        if let Some(cache_time) = self.default_cache_time {
            queries = queries.with_default_cache_time(cache_time);
        }
        if let Some(cache) = self.query_cache {
            debug!(adapter = cache.name(), "Query cache adapter configured");
            queries.set_query_cache(cache);
        }

        Switchyard {
            commands,
            queries,
            events: EventBus::with_config(self.events),
            swr: SwrClient::with_config(self.swr),
        }
    }
}

fn swr_config(settings: &SwitchyardSettings) -> SwrConfig {
    let swr = &settings.swr;
    SwrConfig {
        cache_time: swr.cache_time(),
        stale_time: swr.stale_time(),
        enable_background_refresh: swr.enable_background_refresh,
        refresh_interval: swr.refresh_interval(),
        dedupe_concurrent: swr.dedupe_concurrent,
        retry: swr.retry,
        retry_delay: swr.retry_delay(),
    }
}

pub mod prelude {
    pub use crate::{Switchyard, SwitchyardBuilder, SwitchyardError};
    pub use switchyard_cache::{InMemoryQueryCache, QueryCache};
    pub use switchyard_config::{ConfigManager, SwitchyardSettings};
    pub use switchyard_cqrs::prelude::*;
    pub use switchyard_events::{Event, EventBus, EventHandler, EventHandlerError};
    pub use switchyard_swr::{
        CancellationToken, QueryKey, QueryOptions, QueryResult, SwrClient, SwrConfig, query_key,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swr_config_from_settings() {
        let mut settings = SwitchyardSettings::default();
        settings.swr.retry = 0;
        settings.swr.stale_time_secs = 30;

        let config = swr_config(&settings);
        assert_eq!(config.retry, 0);
        assert_eq!(config.stale_time, Duration::from_secs(30));
        assert_eq!(config.cache_time, Duration::from_secs(300));
        assert!(config.dedupe_concurrent);
    }

    #[tokio::test]
    async fn test_builder_wires_settings() {
        let mut settings = SwitchyardSettings::default();
        settings.query.default_cache_time_secs = 60;
        settings.events.async_handling = false;

        let yard = Switchyard::from_settings(&settings);
        assert_eq!(yard.query_bus().default_cache_time(), Duration::from_secs(60));
        assert!(!yard.event_bus().config().async_handling);
        assert_eq!(yard.swr().config().retry, 3);
        yard.shutdown();
    }
}
