//! Event definitions and traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

/// Domain event published through the [`EventBus`](crate::EventBus)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Event type, used to route to handlers
    pub event_type: String,

    /// Aggregate the event belongs to
    pub aggregate_id: String,

    /// Event payload
    pub payload: Value,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// Optional correlation ID for tracing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Optional causation ID (ID of the message that caused this event)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    /// Event version (for schema evolution)
    pub version: u32,
}

impl Event {
    /// Create new event
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            causation_id: None,
            version: 1,
        }
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Set causation ID
    pub fn with_causation_id(mut self, id: Uuid) -> Self {
        self.causation_id = Some(id);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Deserialize the payload
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, EventHandlerError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| EventHandlerError::ProcessingError(e.to_string()))
    }
}

/// Event handler trait
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle the event
    async fn handle(&self, event: &Event) -> Result<(), EventHandlerError>;
}

/// Event handler error
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event processing error: {0}")]
    ProcessingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_metadata() {
        let cause = Uuid::new_v4();
        let event = Event::new("user_created", "user-123", json!({"name": "Alice"}))
            .with_correlation_id(Uuid::new_v4())
            .with_causation_id(cause)
            .with_version(2);

        assert_eq!(event.event_type, "user_created");
        assert_eq!(event.aggregate_id, "user-123");
        assert!(event.correlation_id.is_some());
        assert_eq!(event.causation_id, Some(cause));
        assert_eq!(event.version, 2);
    }

    #[test]
    fn test_payload_as() {
        #[derive(Deserialize)]
        struct Created {
            name: String,
        }

        let event = Event::new("user_created", "user-123", json!({"name": "Alice"}));
        let created: Created = event.payload_as().unwrap();
        assert_eq!(created.name, "Alice");

        assert!(event.payload_as::<u32>().is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let event = Event::new("order_placed", "order-1", json!(null));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "order_placed");
        assert!(value.get("correlation_id").is_none());
    }
}
