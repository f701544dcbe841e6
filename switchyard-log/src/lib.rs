//! Log output for Switchyard
//!
//! Every Switchyard crate emits `tracing` events; this crate installs the
//! subscriber that writes them. Output defaults to JSON on STDOUT at INFO.
//! `RUST_LOG` takes precedence over the configured level unless an explicit
//! filter is set with [`LogConfig::with_env_filter`].
//!
//! ```no_run
//! use switchyard_log::{LogConfig, LogFormat, LogLevel};
//!
//! let _guard = LogConfig::new()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .expect("logging already initialised");
//! ```

use std::io;
use std::str::FromStr;
use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use tracing::{debug, error, info, trace, warn};
pub use tracing_appender::non_blocking::WorkerGuard;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Unknown log {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LogError::UnknownValue {
                kind: "level",
                value: s.to_string(),
            }),
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    Plain,
    /// Multi-line, for local development
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(LogError::UnknownValue {
                kind: "format",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Include the event target (module path)
    pub targets: bool,
    pub thread_ids: bool,
    /// Explicit filter directives, e.g. `switchyard_swr=debug,info`
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Build a config from string settings such as `("debug", "pretty")`
    pub fn from_names(level: &str, format: &str) -> Result<Self, LogError> {
        Ok(Self::new().level(level.parse()?).format(format.parse()?))
    }

    /// Resolve the effective filter
    ///
    /// An explicit filter wins, then `RUST_LOG`, then the configured level.
    pub fn build_filter(&self) -> Result<EnvFilter, LogError> {
        match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter).map_err(|e| LogError::InvalidFilter {
                filter: filter.clone(),
                message: e.to_string(),
            }),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))),
        }
    }

    /// Install the global subscriber
    ///
    /// Keep the returned guard alive; dropping it flushes buffered lines and
    /// stops the writer thread.
    pub fn init(self) -> Result<WorkerGuard, LogError> {
        let filter = self.build_filter()?;
        let (writer, guard) = match self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        };

        tracing_subscriber::registry()
            .with(self.layer(writer))
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    fn layer(&self, writer: NonBlocking) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.targets)
            .with_thread_ids(self.thread_ids);

        match self.format {
            LogFormat::Json => base.json().with_current_span(true).boxed(),
            LogFormat::Plain => base.with_ansi(false).boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().with_ansi(false).boxed(),
        }
    }
}

impl Default for LogConfig {
    /// JSON to STDOUT at INFO
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            targets: true,
            thread_ids: false,
            env_filter: None,
        }
    }
}
