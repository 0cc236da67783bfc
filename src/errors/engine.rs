//! Error types for the churn aggregation engine.

use super::SearchError;

/// Errors from churn aggregation.
///
/// Errors on the primary `by_date` path propagate to the caller as retryable
/// failures; the comparative `last_period_stats` path degrades to zero stats
/// instead and never surfaces these.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A search-backend call failed.
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// The backend returned a bucket that does not fit the requested
    /// histogram (unknown period key, negative sum, etc.).
    #[error("Inconsistent aggregation result: {details}")]
    InconsistentAggregation {
        /// Description of the inconsistency
        details: String,
    },
}

impl EngineError {
    /// Create an `InconsistentAggregation` error with details.
    pub fn inconsistent_aggregation(details: impl Into<String>) -> Self {
        EngineError::InconsistentAggregation {
            details: details.into(),
        }
    }

    /// Whether retrying the computation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Search(e) => e.is_retryable(),
            EngineError::InconsistentAggregation { .. } => false,
        }
    }
}
