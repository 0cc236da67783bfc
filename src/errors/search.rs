//! Error types for search-backend operations.

/// Errors raised while querying the transactional-event search backend.
///
/// Retryability matters here: timeouts and availability problems are
/// transient and background jobs retry them, while a rejected query body or
/// a malformed response will not improve on retry.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The backend rejected or failed to execute a query.
    #[error("Search query failed: {details}")]
    QueryFailed {
        /// Description of the failure as reported by the backend
        details: String,
    },

    /// A query exceeded the configured execution ceiling.
    #[error("Search query timed out after {seconds}s")]
    Timeout {
        /// The timeout that was exceeded, in seconds
        seconds: u64,
    },

    /// The backend responded but the payload could not be interpreted.
    #[error("Malformed search response: {details}")]
    InvalidResponse {
        /// Description of what was wrong with the response
        details: String,
    },

    /// The backend could not be reached.
    #[error("Search backend unavailable: {details}")]
    Unavailable {
        /// Connection-level details
        details: String,
    },
}

impl SearchError {
    /// Create a `QueryFailed` error with details.
    pub fn query_failed(details: impl Into<String>) -> Self {
        SearchError::QueryFailed {
            details: details.into(),
        }
    }

    /// Create a `Timeout` error from the exceeded duration.
    pub fn timeout(timeout: std::time::Duration) -> Self {
        SearchError::Timeout {
            seconds: timeout.as_secs(),
        }
    }

    /// Create an `InvalidResponse` error with details.
    pub fn invalid_response(details: impl Into<String>) -> Self {
        SearchError::InvalidResponse {
            details: details.into(),
        }
    }

    /// Create an `Unavailable` error with details.
    pub fn unavailable(details: impl Into<String>) -> Self {
        SearchError::Unavailable {
            details: details.into(),
        }
    }

    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Timeout { .. } | SearchError::Unavailable { .. })
    }
}
