//! Event Bus implementation

use crate::event::{Event, EventHandler};
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Event bus for in-process event publishing and handling
#[derive(Clone)]
pub struct EventBus {
    /// Handlers registered for each event type, in registration order
    handlers: Arc<DashMap<String, Vec<Arc<dyn EventHandler>>>>,

    /// Configuration
    config: Arc<EventBusConfig>,
}

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Run each handler as its own task; otherwise run them in order in one task
    pub async_handling: bool,

    /// Enable event logging
    pub enable_logging: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            async_handling: true,
            enable_logging: true,
        }
    }
}

/// Outcome of one publish once every handler has settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers the event was dispatched to
    pub dispatched: usize,
    pub succeeded: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Handle to the handler tasks started by [`EventBus::publish`].
///
/// Dropping it leaves the handlers running.
#[must_use = "drop the handle to fire and forget, or await `settled()`"]
pub struct PublishHandle {
    dispatched: usize,
    /// Each task yields `(succeeded, failed)`
    tasks: Vec<JoinHandle<(usize, usize)>>,
}

impl PublishHandle {
    fn empty() -> Self {
        Self {
            dispatched: 0,
            tasks: Vec::new(),
        }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Wait for every handler and tally the outcomes
    pub async fn settled(self) -> PublishReport {
        let mut report = PublishReport {
            dispatched: self.dispatched,
            ..PublishReport::default()
        };
        for task in self.tasks {
            match task.await {
                Ok((succeeded, _)) => report.succeeded += succeeded,
                Err(e) => error!("Event handler task aborted: {}", e),
            }
        }
        report.failed = report.dispatched - report.succeeded;
        report
    }
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create event bus with custom config
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Register a handler for an event type
    ///
    /// Handlers accumulate; every handler registered for a type receives
    /// each event of that type.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// bus.register("user_created", WelcomeEmailHandler::new());
    /// ```
    pub fn register<H>(&self, event_type: impl Into<String>, handler: H)
    where
        H: EventHandler + 'static,
    {
        let event_type = event_type.into();
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        let mut entry = self.handlers.entry(event_type.clone()).or_default();
        entry.push(handler);

        if self.config.enable_logging {
            debug!(event.type = %event_type, handlers = entry.len(), "Registered event handler");
        }
    }

    /// Publish an event
    ///
    /// Returns as soon as the handlers are scheduled. A failing or panicking
    /// handler is logged and never affects the others. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// let report = bus.publish(Event::new("user_created", "user-1", payload)).settled().await;
    /// ```
    pub fn publish(&self, event: Event) -> PublishHandle {
        if self.config.enable_logging {
            info!(event.type = %event.event_type, event.id = %event.id, "Publishing event");
        }

        // Snapshot so the map lock is not held while handlers run
        let handlers = match self.handlers.get(&event.event_type) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => {
                if self.config.enable_logging {
                    warn!(event.type = %event.event_type, "No handlers registered for event");
                }
                return PublishHandle::empty();
            }
        };

        let dispatched = handlers.len();
        let event = Arc::new(event);

        let tasks = if self.config.async_handling {
            handlers
                .into_iter()
                .map(|handler| {
                    let event = event.clone();
                    tokio::spawn(async move {
                        if run_handler(handler, &event).await {
                            (1, 0)
                        } else {
                            (0, 1)
                        }
                    })
                })
                .collect()
        } else {
            vec![tokio::spawn(async move {
                let mut outcome = (0, 0);
                for handler in handlers {
                    if run_handler(handler, &event).await {
                        outcome.0 += 1;
                    } else {
                        outcome.1 += 1;
                    }
                }
                outcome
            })]
        };

        PublishHandle { dispatched, tasks }
    }

    /// Remove all handlers for an event type
    pub fn unregister_all(&self, event_type: &str) -> usize {
        let removed = self
            .handlers
            .remove(event_type)
            .map(|(_, handlers)| handlers.len())
            .unwrap_or(0);

        if self.config.enable_logging {
            debug!(event.type = event_type, removed, "Unregistered event handlers");
        }
        removed
    }

    /// Clear all handlers
    pub fn clear(&self) {
        self.handlers.clear();
        if self.config.enable_logging {
            info!("Cleared all event handlers");
        }
    }

    /// Get handler count for an event type
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map(|h| h.len()).unwrap_or(0)
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one handler, containing errors and panics. Returns whether it succeeded.
async fn run_handler(handler: Arc<dyn EventHandler>, event: &Event) -> bool {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(event.type = %event.event_type, event.id = %event.id, error = %e, "Event handler failed");
            false
        }
        Err(_) => {
            error!(event.type = %event.event_type, event.id = %event.id, "Event handler panicked");
            false
        }
    }
}

/// Event bus builder
pub struct EventBusBuilder {
    config: EventBusConfig,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
        }
    }

    /// Enable/disable async handling
    pub fn async_handling(mut self, enabled: bool) -> Self {
        self.config.async_handling = enabled;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Build the event bus
    pub fn build(self) -> EventBus {
        EventBus::with_config(self.config)
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
