//! Execution observers (tracing and metrics hooks)
//!
//! Observers are notified around every handler invocation. Whatever an
//! observer does, including returning an error or panicking, is contained
//! here and logged; it never changes the execution result.

use crate::error::ObserverError;
use crate::result::ExecutionResult;
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which bus produced the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Command,
    Query,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::Command => "command",
            ExecutionKind::Query => "query",
        }
    }
}

/// Identifies a single execution
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub kind: ExecutionKind,
    pub message_type: &'a str,
    pub message_id: Uuid,
}

/// Hook invoked around handler execution.
pub trait ExecutionObserver: Send + Sync {
    fn on_start(&self, _ctx: &ExecutionContext<'_>) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_finish(
        &self,
        _ctx: &ExecutionContext<'_>,
        _result: &ExecutionResult,
        _elapsed: Duration,
    ) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Observer that emits `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_start(&self, ctx: &ExecutionContext<'_>) -> Result<(), ObserverError> {
        debug!(
            kind = ctx.kind.as_str(),
            message.type = ctx.message_type,
            message.id = %ctx.message_id,
            "Execution started"
        );
        Ok(())
    }

    fn on_finish(
        &self,
        ctx: &ExecutionContext<'_>,
        result: &ExecutionResult,
        elapsed: Duration,
    ) -> Result<(), ObserverError> {
        info!(
            kind = ctx.kind.as_str(),
            message.type = ctx.message_type,
            message.id = %ctx.message_id,
            success = result.success,
            duration.ms = elapsed.as_millis() as u64,
            "Execution finished"
        );
        Ok(())
    }
}

/// Observer list owned by a bus
#[derive(Clone, Default)]
pub(crate) struct Observers {
    observers: Arc<RwLock<Vec<Arc<dyn ExecutionObserver>>>>,
}

impl Observers {
    pub(crate) fn add(&self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.write().push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ExecutionObserver>> {
        self.observers.read().clone()
    }

    pub(crate) fn notify_start(&self, ctx: &ExecutionContext<'_>) {
        for observer in self.snapshot() {
            contain(ctx, "on_start", || observer.on_start(ctx));
        }
    }

    pub(crate) fn notify_finish(
        &self,
        ctx: &ExecutionContext<'_>,
        result: &ExecutionResult,
        elapsed: Duration,
    ) {
        for observer in self.snapshot() {
            contain(ctx, "on_finish", || observer.on_finish(ctx, result, elapsed));
        }
    }
}

fn contain<F>(ctx: &ExecutionContext<'_>, hook: &'static str, f: F)
where
    F: FnOnce() -> Result<(), ObserverError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            hook,
            message.type = ctx.message_type,
            error = %e,
            "Execution observer failed"
        ),
        Err(_) => warn!(
            hook,
            message.type = ctx.message_type,
            "Execution observer panicked"
        ),
    }
}
