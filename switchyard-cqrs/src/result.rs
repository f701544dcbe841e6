//! Structured execution outcome

use crate::error::CqrsError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of executing a command or query through a bus.
///
/// Every failure mode (missing handler, handler error, panic, short-circuit
/// middleware) ends up here with `success == false` and a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when the query bus answered from its cache adapter
    #[serde(default)]
    pub from_cache: bool,
}

impl ExecutionResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            from_cache: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            from_cache: false,
        }
    }

    /// A successful result served from a cache.
    pub fn cached(data: Value) -> Self {
        Self {
            from_cache: true,
            ..Self::success(data)
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Convert into a plain `Result`, keeping the payload on success.
    pub fn into_result(self) -> Result<Value, String> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "Unknown execution failure".to_string()))
        }
    }

    /// Deserialize the payload of a successful result.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, CqrsError> {
        let data = self.into_result().map_err(CqrsError::ExecutionFailed)?;
        serde_json::from_value(data).map_err(|e| CqrsError::Serialization(e.to_string()))
    }
}
