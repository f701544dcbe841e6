//! Error types shared by the command and query buses.

use std::any::Any;
use thiserror::Error;

/// Error returned by a command or query handler.
///
/// The bus never propagates these; they are rendered into the failure
/// message of an [`ExecutionResult`](crate::ExecutionResult).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::InvalidPayload(err.to_string())
    }
}

/// Error surfaced by the typed `dispatch` helpers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CqrsError {
    #[error("No handler registered for {0}")]
    HandlerNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Error raised by an execution observer.
#[derive(Debug, Error)]
#[error("Observer error: {0}")]
pub struct ObserverError(pub String);

/// Render a caught panic payload as a failure message.
pub(crate) fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Handler panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message_is_verbatim() {
        assert_eq!(HandlerError::failed("X").to_string(), "X");
        assert_eq!(
            HandlerError::Validation("email".into()).to_string(),
            "Validation error: email"
        );
    }

    #[test]
    fn test_describe_panic() {
        assert_eq!(describe_panic(Box::new("boom")), "Handler panicked: boom");
        assert_eq!(
            describe_panic(Box::new(String::from("owned"))),
            "Handler panicked: owned"
        );
        assert_eq!(describe_panic(Box::new(7u8)), "Handler panicked: unknown panic");
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        assert!(matches!(HandlerError::from(err), HandlerError::InvalidPayload(_)));
    }
}
