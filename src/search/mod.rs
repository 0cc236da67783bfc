//! Search-backend contract for churn analytics
//!
//! The engine is a pure function of (seller, dates, products, granularity)
//! against a search backend that supports two operations: a paginated
//! date-histogram of deactivation events, and a cardinality count of active
//! subscriptions as of a cutoff. Implement [`SearchBackend`] to plug in a
//! real index client; tests use an in-memory implementation that interprets
//! the typed queries over a scripted subscription ledger.
//!
//! # Pagination
//!
//! Bucket pages are cursor-based: each call returns up to the query's page
//! size of buckets plus an opaque `after` cursor. The engine repeats the
//! call with the returned cursor until a page comes back shorter than the
//! page size. Churn events in one period can exceed a single aggregation
//! response, so backends must not assume one page suffices.

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::PeriodKey;

pub mod query;

pub use query::{ActiveSubscribersQuery, ChurnEventsQuery};

/// Opaque pagination cursor returned by a composite aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeCursor(pub String);

/// One date-histogram bucket of churn events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChurnBucket {
    /// Period key formatted per the query's granularity
    pub period: PeriodKey,
    /// Deactivated subscriptions in this bucket
    pub churned_users: u64,
    /// Sum of their prices in minor currency units
    pub revenue_lost_cents: u64,
}

/// One page of churn-event buckets
#[derive(Debug, Clone, Default)]
pub struct BucketPage {
    pub buckets: Vec<ChurnBucket>,
    /// Cursor for the next page; `None` on the final page
    pub after: Option<CompositeCursor>,
}

/// Contract with the transactional-event search index
///
/// # Thread Safety
///
/// Implementations must be thread-safe; the engine issues active-subscriber
/// queries for multiple periods concurrently.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns one page of the churn-event date histogram
    ///
    /// `after` is the cursor from the previous page, or `None` for the
    /// first page. A page shorter than `query.page_size` is the last one.
    async fn churn_buckets(
        &self,
        query: &ChurnEventsQuery,
        after: Option<&CompositeCursor>,
    ) -> Result<BucketPage, SearchError>;

    /// Returns the number of distinct subscriptions that existed and had
    /// not yet deactivated as of the query's cutoff instant
    async fn active_subscriber_count(
        &self,
        query: &ActiveSubscribersQuery,
    ) -> Result<u64, SearchError>;
}
