//! Typed Switchyard settings
//!
//! Reads the `command`, `query`, `events`, `swr` and `log` sections from a
//! [`ConfigManager`]. Missing keys fall back to the defaults below; keys that
//! are present but malformed are an error.

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigManager, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSettings {
    pub status_retention_hours: u64,
    pub status_sweep_interval_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            status_retention_hours: 24,
            status_sweep_interval_secs: 3600,
        }
    }
}

impl CommandSettings {
    pub fn status_retention(&self) -> Duration {
        Duration::from_secs(self.status_retention_hours * 3600)
    }

    pub fn status_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.status_sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySettings {
    pub default_cache_time_secs: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_cache_time_secs: 300,
        }
    }
}

impl QuerySettings {
    pub fn default_cache_time(&self) -> Duration {
        Duration::from_secs(self.default_cache_time_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    pub async_handling: bool,
    pub enable_logging: bool,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            async_handling: true,
            enable_logging: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwrSettings {
    pub cache_time_secs: u64,
    pub stale_time_secs: u64,
    pub enable_background_refresh: bool,
    pub refresh_interval_secs: u64,
    pub dedupe_concurrent: bool,
    pub retry: u32,
    pub retry_delay_ms: u64,
}

impl Default for SwrSettings {
    fn default() -> Self {
        Self {
            cache_time_secs: 300,
            stale_time_secs: 0,
            enable_background_refresh: false,
            refresh_interval_secs: 0,
            dedupe_concurrent: true,
            retry: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl SwrSettings {
    pub fn cache_time(&self) -> Duration {
        Duration::from_secs(self.cache_time_secs)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// All Switchyard settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchyardSettings {
    pub command: CommandSettings,
    pub query: QuerySettings,
    pub events: EventSettings,
    pub swr: SwrSettings,
    pub log: LogSettings,
}

impl SwitchyardSettings {
    /// Read and validate settings from `config`
    pub fn load(config: &ConfigManager) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            command: CommandSettings {
                status_retention_hours: read(
                    config,
                    "command.status_retention_hours",
                    defaults.command.status_retention_hours,
                )?,
                status_sweep_interval_secs: read(
                    config,
                    "command.status_sweep_interval_secs",
                    defaults.command.status_sweep_interval_secs,
                )?,
            },
            query: QuerySettings {
                default_cache_time_secs: read(
                    config,
                    "query.default_cache_time_secs",
                    defaults.query.default_cache_time_secs,
                )?,
            },
            events: EventSettings {
                async_handling: read(
                    config,
                    "events.async_handling",
                    defaults.events.async_handling,
                )?,
                enable_logging: read(
                    config,
                    "events.enable_logging",
                    defaults.events.enable_logging,
                )?,
            },
            swr: SwrSettings {
                cache_time_secs: read(config, "swr.cache_time_secs", defaults.swr.cache_time_secs)?,
                stale_time_secs: read(config, "swr.stale_time_secs", defaults.swr.stale_time_secs)?,
                enable_background_refresh: read(
                    config,
                    "swr.enable_background_refresh",
                    defaults.swr.enable_background_refresh,
                )?,
                refresh_interval_secs: read(
                    config,
                    "swr.refresh_interval_secs",
                    defaults.swr.refresh_interval_secs,
                )?,
                dedupe_concurrent: read(
                    config,
                    "swr.dedupe_concurrent",
                    defaults.swr.dedupe_concurrent,
                )?,
                retry: read(config, "swr.retry", defaults.swr.retry)?,
                retry_delay_ms: read(config, "swr.retry_delay_ms", defaults.swr.retry_delay_ms)?,
            },
            log: LogSettings {
                level: read(config, "log.level", defaults.log.level)?,
                format: read(config, "log.format", defaults.log.format)?,
            },
        };

        settings.validate()?;
        Ok(settings)
    }
}

fn read<T: serde::de::DeserializeOwned>(config: &ConfigManager, key: &str, default: T) -> Result<T> {
    Ok(config.get_opt(key)?.unwrap_or(default))
}

impl Validate for SwitchyardSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::positive(
            self.command.status_sweep_interval_secs,
            "command.status_sweep_interval_secs",
        )?;
        ConfigValidator::at_most(
            self.swr.stale_time_secs,
            self.swr.cache_time_secs,
            "swr.stale_time_secs",
            "swr.cache_time_secs",
        )?;
        ConfigValidator::one_of(
            &self.log.level.to_ascii_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;
        ConfigValidator::one_of(
            &self.log.format.to_ascii_lowercase().as_str(),
            &["json", "plain", "pretty", "compact"],
            "log.format",
        )?;
        Ok(())
    }
}
