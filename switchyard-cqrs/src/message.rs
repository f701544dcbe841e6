//! Command and query envelopes

use crate::error::HandlerError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// A write request routed by its type name.
///
/// Commands are immutable once built; the id and timestamp are assigned at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    id: Uuid,
    #[serde(rename = "type")]
    command_type: String,
    timestamp: DateTime<Utc>,
    payload: Value,
}

impl Command {
    pub fn new(command_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_type: command_type.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Build an envelope from a typed command message.
    pub fn from_message<C: CommandMessage>(message: &C) -> Result<Self, serde_json::Error> {
        Ok(Self::new(C::TYPE, serde_json::to_value(message)?))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// A read request routed by its type name, with optional caching hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    id: Uuid,
    #[serde(rename = "type")]
    query_type: String,
    timestamp: DateTime<Utc>,
    payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_time: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stale_time: Option<Duration>,
}

impl Query {
    pub fn new(query_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            query_type: query_type.into(),
            timestamp: Utc::now(),
            payload,
            cache_key: None,
            cache_time: None,
            stale_time: None,
        }
    }

    /// Build an envelope from a typed query message, carrying its cache hints.
    pub fn from_message<Q: QueryMessage>(message: &Q) -> Result<Self, serde_json::Error> {
        let mut query = Self::new(Q::TYPE, serde_json::to_value(message)?);
        query.cache_key = message.cache_key();
        query.cache_time = message.cache_time();
        query.stale_time = message.stale_time();
        Ok(query)
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time);
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    pub fn cache_time(&self) -> Option<Duration> {
        self.cache_time
    }

    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_time
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Typed command that can be carried in a [`Command`] envelope.
pub trait CommandMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing name
    const TYPE: &'static str;

    /// Handler output
    type Output: Serialize + DeserializeOwned + Send;
}

/// Typed query that can be carried in a [`Query`] envelope.
pub trait QueryMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing name
    const TYPE: &'static str;

    /// Handler output
    type Output: Serialize + DeserializeOwned + Send;

    fn cache_key(&self) -> Option<String> {
        None
    }

    fn cache_time(&self) -> Option<Duration> {
        None
    }

    fn stale_time(&self) -> Option<Duration> {
        None
    }
}
