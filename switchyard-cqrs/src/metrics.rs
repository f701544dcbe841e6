//! Prometheus execution metrics
//!
//! Enabled with the `metrics` feature. The observer owns its registry so
//! several buses (or tests) never collide on metric names.

use crate::error::ObserverError;
use crate::observer::{ExecutionContext, ExecutionObserver};
use crate::result::ExecutionResult;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Latency buckets (in seconds)
pub const EXECUTION_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Counts executions per kind, message type and outcome, and records latency.
#[derive(Clone)]
pub struct PrometheusObserver {
    registry: Registry,
    executions: IntCounterVec,
    duration: HistogramVec,
}

impl PrometheusObserver {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let executions = IntCounterVec::new(
            Opts::new("switchyard_executions_total", "Total command and query executions"),
            &["kind", "type", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_execution_duration_seconds",
                "Command and query execution latency",
            )
            .buckets(EXECUTION_LATENCY_BUCKETS.to_vec()),
            &["kind", "type"],
        )?;

        registry.register(Box::new(executions.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            executions,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the metrics in the Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::from("# Error encoding metrics\n");
        }
        String::from_utf8(buffer)
            .unwrap_or_else(|_| String::from("# Error converting metrics to UTF-8\n"))
    }
}

impl ExecutionObserver for PrometheusObserver {
    fn on_finish(
        &self,
        ctx: &ExecutionContext<'_>,
        result: &ExecutionResult,
        elapsed: Duration,
    ) -> Result<(), ObserverError> {
        let kind = ctx.kind.as_str();
        let outcome = if result.success { "success" } else { "failure" };

        self.executions
            .get_metric_with_label_values(&[kind, ctx.message_type, outcome])
            .map_err(|e| ObserverError(e.to_string()))?
            .inc();
        self.duration
            .get_metric_with_label_values(&[kind, ctx.message_type])
            .map_err(|e| ObserverError(e.to_string()))?
            .observe(elapsed.as_secs_f64());
        Ok(())
    }
}
