//! SWR error types

use thiserror::Error;

/// Terminal error of a query.
///
/// Callers deduplicated onto one fetch share a single `Arc<SwrError>`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwrError {
    /// The caller's cancellation token fired before the fetch settled
    #[error("aborted")]
    Aborted,

    /// The query function failed on its final attempt
    #[error("{0}")]
    Fetch(String),

    #[error("Query function panicked: {0}")]
    Panicked(String),

    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

impl SwrError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, SwrError::Aborted)
    }
}
