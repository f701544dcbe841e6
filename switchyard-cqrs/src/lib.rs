//! Command and query buses for the Switchyard dispatch core
//!
//! This crate separates writes (commands) from reads (queries), routing each
//! message to the single handler registered for its type name.
//!
//! ## Features
//!
//! - **Command Bus** - Middleware chain, async execution with status tracking
//! - **Query Bus** - Optional cache adapter, prefetch, invalidation
//! - **Typed handlers** - Domain structs dispatched through serde payloads
//! - **Observers** - Tracing and Prometheus hooks that never affect results
//!
//! Neither bus propagates handler failures: a missing handler, a handler
//! error or a panic all come back as a failed [`ExecutionResult`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchyard_cqrs::*;
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct CreateUserCommand {
//!     email: String,
//! }
//!
//! impl CommandMessage for CreateUserCommand {
//!     const TYPE: &'static str = "CreateUser";
//!     type Output = String; // User ID
//! }
//!
//! struct CreateUserHandler;
//!
//! #[async_trait]
//! impl HandleCommand<CreateUserCommand> for CreateUserHandler {
//!     async fn handle(&self, command: CreateUserCommand) -> Result<String, HandlerError> {
//!         Ok(format!("user-{}", command.email))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let command_bus = CommandBus::new();
//!     command_bus.add_middleware(LoggingMiddleware::new());
//!     command_bus.register_typed::<CreateUserCommand, _>(CreateUserHandler);
//!
//!     let user_id = command_bus
//!         .dispatch(&CreateUserCommand { email: "alice@example.com".into() })
//!         .await?;
//!
//!     // Fire and track
//!     let id = command_bus.execute_async(Command::new(
//!         "CreateUser",
//!         serde_json::json!({ "email": "bob@example.com" }),
//!     ));
//!     println!("{:?}", command_bus.get_execution_status(id));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Query caching
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchyard_cache::InMemoryQueryCache;
//!
//! let query_bus = QueryBus::new();
//! query_bus.set_query_cache(Arc::new(InMemoryQueryCache::new()));
//!
//! let query = Query::new("GetUser", serde_json::json!({ "id": 42 }));
//! let result = query_bus.execute_with_cache(query, None, None).await;
//!
//! // Drop every cached GetUser result
//! query_bus.invalidate_cache("GetUser", None).await;
//! ```

pub mod command;
pub mod error;
pub mod message;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod middleware;
pub mod observer;
pub mod query;
pub mod registry;
pub mod result;
pub mod status;

pub use command::{CommandBus, CommandHandler, HandleCommand, TypedCommandHandler};
pub use error::{CqrsError, HandlerError, ObserverError};
pub use message::{Command, CommandMessage, Query, QueryMessage};
#[cfg(feature = "metrics")]
pub use metrics::PrometheusObserver;
pub use middleware::{
    CommandMiddleware, LoggingMiddleware, Next, TimeoutMiddleware, ValidationMiddleware,
};
pub use observer::{ExecutionContext, ExecutionKind, ExecutionObserver, TracingObserver};
pub use query::{DEFAULT_CACHE_TIME, HandleQuery, QueryBus, QueryHandler, TypedQueryHandler};
pub use registry::ExecutionRegistry;
pub use result::ExecutionResult;
pub use status::{CommandStatus, ExecutionStatus};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::{CommandBus, CommandHandler, HandleCommand};
    pub use crate::error::{CqrsError, HandlerError};
    pub use crate::message::{Command, CommandMessage, Query, QueryMessage};
    pub use crate::middleware::{CommandMiddleware, Next};
    pub use crate::query::{HandleQuery, QueryBus, QueryHandler};
    pub use crate::result::ExecutionResult;
    pub use crate::status::{CommandStatus, ExecutionStatus};
}
