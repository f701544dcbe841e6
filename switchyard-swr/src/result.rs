//! Outcome of an SWR query

use crate::error::SwrError;
use std::sync::Arc;

/// Result of [`SwrClient::query`](crate::SwrClient::query)
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub data: Option<T>,
    pub is_success: bool,
    pub is_error: bool,
    /// Served from the cache without waiting for a fetch
    pub is_from_cache: bool,
    pub error: Option<Arc<SwrError>>,
}

impl<T> QueryResult<T> {
    pub(crate) fn fetched(data: T) -> Self {
        Self {
            data: Some(data),
            is_success: true,
            is_error: false,
            is_from_cache: false,
            error: None,
        }
    }

    pub(crate) fn cached(data: T) -> Self {
        Self {
            is_from_cache: true,
            ..Self::fetched(data)
        }
    }

    pub(crate) fn failed(error: Arc<SwrError>) -> Self {
        Self {
            data: None,
            is_success: false,
            is_error: true,
            is_from_cache: false,
            error: Some(error),
        }
    }

    /// Project the data, keeping the flags
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> QueryResult<U> {
        QueryResult {
            data: self.data.map(f),
            is_success: self.is_success,
            is_error: self.is_error,
            is_from_cache: self.is_from_cache,
            error: self.error,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    pub fn into_result(self) -> Result<T, Arc<SwrError>> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(error),
            (None, None) => Err(Arc::new(SwrError::Fetch("no data".to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_flags() {
        let result = QueryResult::cached(vec![1, 2, 3]).map(|v| v.len());
        assert_eq!(result.data, Some(3));
        assert!(result.is_success);
        assert!(result.is_from_cache);
    }

    #[test]
    fn test_failure_shape() {
        let result: QueryResult<u8> = QueryResult::failed(Arc::new(SwrError::Aborted));
        assert!(result.is_error);
        assert!(!result.is_success);
        assert_eq!(result.error_message().as_deref(), Some("aborted"));
        assert!(result.into_result().unwrap_err().is_aborted());
    }
}
