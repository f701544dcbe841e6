//! Command handling for CQRS

use crate::error::{CqrsError, HandlerError, describe_panic};
use crate::message::{Command, CommandMessage};
use crate::middleware::{CommandMiddleware, Next, build_chain};
use crate::observer::{ExecutionContext, ExecutionKind, ExecutionObserver, Observers};
use crate::registry::ExecutionRegistry;
use crate::result::ExecutionResult;
use crate::status::ExecutionStatus;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Command handler trait
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle the command
    async fn handle(&self, command: &Command) -> Result<Value, HandlerError>;
}

/// Handler for a typed [`CommandMessage`]
#[async_trait]
pub trait HandleCommand<C: CommandMessage>: Send + Sync {
    async fn handle(&self, command: C) -> Result<C::Output, HandlerError>;
}

/// Adapts a [`HandleCommand`] implementation to the envelope-level contract
pub struct TypedCommandHandler<C: CommandMessage, H: HandleCommand<C>> {
    handler: H,
    _phantom: PhantomData<fn() -> C>,
}

impl<C: CommandMessage, H: HandleCommand<C>> TypedCommandHandler<C, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<C: CommandMessage, H: HandleCommand<C>> CommandHandler for TypedCommandHandler<C, H> {
    async fn handle(&self, command: &Command) -> Result<Value, HandlerError> {
        let message: C = command.payload_as()?;
        let output = self.handler.handle(message).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Command bus
///
/// Cloning is cheap; clones share handlers, middleware and status records.
#[derive(Clone)]
pub struct CommandBus {
    registry: Arc<ExecutionRegistry<dyn CommandHandler>>,
    middlewares: Arc<RwLock<Vec<Arc<dyn CommandMiddleware>>>>,
    statuses: Arc<DashMap<Uuid, ExecutionStatus>>,
    observers: Observers,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CommandBus {
    /// Create new command bus
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ExecutionRegistry::new()),
            middlewares: Arc::new(RwLock::new(Vec::new())),
            statuses: Arc::new(DashMap::new()),
            observers: Observers::default(),
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a command handler for a type name (last registration wins)
    pub fn register<H>(&self, command_type: impl Into<String>, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.registry.register(command_type, Arc::new(handler));
    }

    /// Register a handler for a typed command message
    pub fn register_typed<C, H>(&self, handler: H)
    where
        C: CommandMessage,
        H: HandleCommand<C> + 'static,
    {
        self.register(C::TYPE, TypedCommandHandler::<C, H>::new(handler));
    }

    pub fn registry(&self) -> &ExecutionRegistry<dyn CommandHandler> {
        &self.registry
    }

    /// Append a middleware; the first one added is the outermost layer
    pub fn add_middleware<M: CommandMiddleware + 'static>(&self, middleware: M) {
        debug!(middleware = middleware.name(), "Adding command middleware");
        self.middlewares.write().push(Arc::new(middleware));
    }

    /// Remove every middleware with the given name
    pub fn remove_middleware(&self, name: &str) -> bool {
        let mut middlewares = self.middlewares.write();
        let before = middlewares.len();
        middlewares.retain(|m| m.name() != name);
        before != middlewares.len()
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middlewares
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub fn add_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.add(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Execute a command through the middleware chain.
    ///
    /// Never fails: a missing handler, a handler error or a panic anywhere in
    /// the chain is reported as a failure result.
    pub async fn execute(&self, command: Command) -> ExecutionResult {
        let command_type = command.command_type().to_string();
        let command_id = command.id();

        let Some(handler) = self.registry.resolve(&command_type) else {
            warn!(command.type = %command_type, "No handler registered for command");
            return ExecutionResult::failure(format!(
                "No handler registered for command: {}",
                command_type
            ));
        };

        let ctx = ExecutionContext {
            kind: ExecutionKind::Command,
            message_type: &command_type,
            message_id: command_id,
        };
        self.observers.notify_start(&ctx);
        let started = Instant::now();

        let middlewares = self.middlewares.read().clone();
        let terminal: Next = Box::new(move |command: Command| {
            invoke_handler(handler, command).boxed() as BoxFuture<'static, ExecutionResult>
        });
        let chain = build_chain(&middlewares, terminal);

        let result = match AssertUnwindSafe(chain(command)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => ExecutionResult::failure(describe_panic(panic)),
        };

        self.observers
            .notify_finish(&ctx, &result, started.elapsed());

        if !result.success {
            error!(
                command.type = %command_type,
                command.id = %command_id,
                error = result.error_message().unwrap_or_default(),
                "Command execution failed"
            );
        }

        result
    }

    /// Dispatch a typed command and decode its output
    pub async fn dispatch<C: CommandMessage>(&self, message: &C) -> Result<C::Output, CqrsError> {
        if !self.registry.contains(C::TYPE) {
            return Err(CqrsError::HandlerNotFound(C::TYPE.to_string()));
        }
        let command =
            Command::from_message(message).map_err(|e| CqrsError::Serialization(e.to_string()))?;
        self.execute(command).await.into_typed()
    }

    /// Start executing a command in the background and return its id.
    ///
    /// A `pending` status record exists before this returns; progress is
    /// observable through [`CommandBus::get_execution_status`]. Must be
    /// called from within a Tokio runtime.
    pub fn execute_async(&self, command: Command) -> Uuid {
        let command_id = command.id();
        self.statuses
            .insert(command_id, ExecutionStatus::pending(&command));
        debug!(command.type = command.command_type(), command.id = %command_id, "Command queued");

        let bus = self.clone();
        tokio::spawn(async move {
            bus.update_status(command_id, |status| status.mark_running());
            let result = bus.execute(command).await;
            bus.update_status(command_id, |status| status.settle(&result));
        });

        command_id
    }

    pub fn get_execution_status(&self, command_id: Uuid) -> Option<ExecutionStatus> {
        self.statuses.get(&command_id).map(|entry| entry.value().clone())
    }

    /// Number of status records currently held
    pub fn tracked_count(&self) -> usize {
        self.statuses.len()
    }

    fn update_status<F>(&self, command_id: Uuid, update: F)
    where
        F: FnOnce(&mut ExecutionStatus) -> bool,
    {
        if let Some(mut status) = self.statuses.get_mut(&command_id) {
            if !update(&mut *status) {
                warn!(command.id = %command_id, status = ?status.status, "Ignored status regression");
            }
        }
    }

    /// Remove completed or failed records older than `max_age`.
    ///
    /// Pending and running records are never touched.
    pub fn cleanup_expired_status(&self, max_age: Duration) -> usize {
        sweep_statuses(&self.statuses, max_age)
    }

    /// Run [`CommandBus::cleanup_expired_status`] every `interval`, removing
    /// records older than `retention`. Returns `false` if already running.
    pub fn start_status_sweep(&self, interval: Duration, retention: Duration) -> bool {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let statuses: Weak<DashMap<Uuid, ExecutionStatus>> = Arc::downgrade(&self.statuses);

        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(statuses) = statuses.upgrade() else {
                    break;
                };
                let removed = sweep_statuses(&statuses, retention);
                if removed > 0 {
                    debug!(removed, "Swept expired command status records");
                }
            }
        }));

        info!(
            interval.secs = interval.as_secs(),
            retention.secs = retention.as_secs(),
            "Started command status sweep"
        );
        true
    }

    /// Stop the status sweep
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            debug!("Stopped command status sweep");
        }
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn invoke_handler(handler: Arc<dyn CommandHandler>, command: Command) -> ExecutionResult {
    match handler.handle(&command).await {
        Ok(data) => ExecutionResult::success(data),
        Err(e) => ExecutionResult::failure(e.to_string()),
    }
}

fn sweep_statuses(statuses: &DashMap<Uuid, ExecutionStatus>, max_age: Duration) -> usize {
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    let cutoff = chrono::Utc::now()
        .checked_sub_signed(max_age)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

    let before = statuses.len();
    statuses.retain(|_, status| !status.expired_before(cutoff));
    before.saturating_sub(statuses.len())
}
