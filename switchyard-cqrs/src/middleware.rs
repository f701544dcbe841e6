//! Command middleware chain
//!
//! Middleware wraps command execution in onion order: the first middleware
//! added is the outermost layer. Each layer receives the command and a
//! [`Next`] continuation; not calling `next` short-circuits the chain.

use crate::message::Command;
use crate::result::ExecutionResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Continuation for the remainder of the chain
pub type Next = Box<dyn FnOnce(Command) -> BoxFuture<'static, ExecutionResult> + Send>;

/// Middleware trait for processing commands before they reach the handler
#[async_trait]
pub trait CommandMiddleware: Send + Sync {
    /// Unique name, used by `remove_middleware`
    fn name(&self) -> &str;

    /// Process the command and optionally pass it to `next`
    async fn execute(&self, command: Command, next: Next) -> ExecutionResult;
}

/// Fold the middleware list right-to-left around `terminal`.
pub(crate) fn build_chain(middlewares: &[Arc<dyn CommandMiddleware>], terminal: Next) -> Next {
    middlewares.iter().rev().fold(terminal, |next, middleware| {
        let middleware = middleware.clone();
        let wrapped: Next = Box::new(move |command: Command| {
            Box::pin(async move {
                trace!(middleware = middleware.name(), "Executing middleware");
                middleware.execute(command, next).await
            }) as BoxFuture<'static, ExecutionResult>
        });
        wrapped
    })
}

// ========== Built-in Middleware ==========

/// Logs command type, duration and outcome.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn execute(&self, command: Command, next: Next) -> ExecutionResult {
        let command_type = command.command_type().to_string();
        let command_id = command.id();
        let start = Instant::now();

        debug!(command.type = %command_type, command.id = %command_id, "Command received");

        let result = next(command).await;

        let elapsed = start.elapsed();
        if result.success {
            info!(
                command.type = %command_type,
                duration.ms = elapsed.as_millis() as u64,
                "Command succeeded"
            );
        } else {
            error!(
                command.type = %command_type,
                error = result.error_message().unwrap_or_default(),
                duration.ms = elapsed.as_millis() as u64,
                "Command failed"
            );
        }

        result
    }
}

/// Fails the command when the rest of the chain exceeds a time budget.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandMiddleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn execute(&self, command: Command, next: Next) -> ExecutionResult {
        let command_type = command.command_type().to_string();
        match tokio::time::timeout(self.timeout, next(command)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command.type = %command_type, timeout.ms = self.timeout.as_millis() as u64, "Command timed out");
                ExecutionResult::failure(format!(
                    "Command timed out after {}ms",
                    self.timeout.as_millis()
                ))
            }
        }
    }
}

type Rule = Arc<dyn Fn(&Command) -> Result<(), String> + Send + Sync>;

/// Gate that rejects commands failing a rule without reaching the handler.
#[derive(Clone)]
pub struct ValidationMiddleware {
    name: String,
    rule: Rule,
}

impl ValidationMiddleware {
    pub fn new<F>(name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Command) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            rule: Arc::new(rule),
        }
    }
}

#[async_trait]
impl CommandMiddleware for ValidationMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: Command, next: Next) -> ExecutionResult {
        match (self.rule)(&command) {
            Ok(()) => next(command).await,
            Err(reason) => {
                debug!(command.type = command.command_type(), reason = %reason, "Command rejected");
                ExecutionResult::failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CommandMiddleware for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, command: Command, next: Next) -> ExecutionResult {
            self.log.lock().push(format!("{}:before", self.name));
            let result = next(command).await;
            self.log.lock().push(format!("{}:after", self.name));
            result
        }
    }

    fn terminal(log: Arc<Mutex<Vec<String>>>) -> Next {
        Box::new(move |_command| {
            Box::pin(async move {
                log.lock().push("handler".to_string());
                ExecutionResult::success(json!(null))
            }) as BoxFuture<'static, ExecutionResult>
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let middlewares: Vec<Arc<dyn CommandMiddleware>> = vec![
            Arc::new(Recording { name: "outer", log: log.clone() }),
            Arc::new(Recording { name: "inner", log: log.clone() }),
        ];

        let chain = build_chain(&middlewares, terminal(log.clone()));
        let result = chain(Command::new("Test", json!({}))).await;

        assert!(result.success);
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_validation_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let middlewares: Vec<Arc<dyn CommandMiddleware>> =
            vec![Arc::new(ValidationMiddleware::new("auth", |_| {
                Err("Unauthorized".to_string())
            }))];

        let chain = build_chain(&middlewares, terminal(log.clone()));
        let result = chain(Command::new("Test", json!({}))).await;

        assert!(!result.success);
        assert_eq!(result.error_message(), Some("Unauthorized"));
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_middleware() {
        let middlewares: Vec<Arc<dyn CommandMiddleware>> =
            vec![Arc::new(TimeoutMiddleware::new(Duration::from_millis(50)))];
        let slow: Next = Box::new(|_command| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                ExecutionResult::success(json!(1))
            }) as BoxFuture<'static, ExecutionResult>
        });

        let result = build_chain(&middlewares, slow)(Command::new("Slow", json!({}))).await;
        assert!(!result.success);
        assert!(result.error_message().unwrap().contains("timed out"));
    }
}
