//! Error types for the churnscan library.
//!
//! This module provides strongly-typed errors for all public APIs. It follows
//! a hybrid approach:
//!
//! - **Module-specific errors** for fine-grained handling ([`SearchError`],
//!   [`EngineError`], [`CacheError`])
//! - **Unified error type** ([`ChurnscanError`]) for convenience when the
//!   source does not matter
//!
//! # Examples
//!
//! ## Fine-grained error handling
//!
//! ```rust,ignore
//! use churnscan::errors::{ChurnscanError, SearchError};
//!
//! match proxy.data_for_dates(start, end, granularity, &products).await {
//!     Ok(data) => render(data),
//!     Err(ChurnscanError::Engine(e)) if e.is_retryable() => retry_later(),
//!     Err(e) => report(e),
//! }
//! ```

mod cache;
mod engine;
mod search;

pub use cache::CacheError;
pub use engine::EngineError;
pub use search::SearchError;

/// Unified error type for all churnscan operations.
///
/// All module-specific error types convert to `ChurnscanError` via `From`
/// implementations, so `?` propagates them naturally.
#[derive(Debug, thiserror::Error)]
pub enum ChurnscanError {
    /// Error from churn aggregation.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Error from the cache store.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error from the search backend outside an engine computation.
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl ChurnscanError {
    /// Whether retrying the operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChurnscanError::Engine(e) => e.is_retryable(),
            ChurnscanError::Search(e) => e.is_retryable(),
            ChurnscanError::Cache(_) => true,
        }
    }
}
