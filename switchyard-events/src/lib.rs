//! In-process event bus for the Switchyard dispatch core
//!
//! Events fan out to every handler registered for their type. Publishing
//! never waits for handlers and never fails because of them.
//!
//! ## Features
//!
//! - **Event Bus** - Publish/subscribe keyed by event type name
//! - **Isolation** - A failing or panicking handler is logged, not propagated
//! - **Reports** - Optionally await a [`PublishReport`] for a publish
//! - **Flexible** - Concurrent or sequential handler execution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchyard_events::*;
//! use async_trait::async_trait;
//!
//! struct EmailHandler;
//!
//! #[async_trait]
//! impl EventHandler for EmailHandler {
//!     async fn handle(&self, event: &Event) -> Result<(), EventHandlerError> {
//!         println!("Sending welcome email for {}", event.aggregate_id);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::new();
//!     bus.register("user_created", EmailHandler);
//!     bus.register("user_created", AnalyticsHandler);
//!
//!     let event = Event::new("user_created", "user-123", serde_json::json!({
//!         "email": "alice@example.com",
//!     }));
//!
//!     // Fire and forget
//!     drop(bus.publish(event.clone()));
//!
//!     // Or wait for every handler
//!     let report = bus.publish(event).settled().await;
//!     assert_eq!(report.dispatched, 2);
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! let bus = EventBusBuilder::new()
//!     .async_handling(false)          // Run handlers one after another
//!     .enable_logging(true)           // Log events
//!     .build();
//! ```

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventBusBuilder, EventBusConfig, PublishHandle, PublishReport};
pub use event::{Event, EventHandler, EventHandlerError};
