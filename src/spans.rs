//! Tracing span creation helpers for churnscan operations.
//!
//! Telemetry is kept orthogonal to business logic: instead of `#[instrument]`
//! attributes, each instrumented operation has a span helper here.
//!
//! Usage pattern:
//! ```rust,ignore
//! pub async fn my_operation(&self, param: Type) -> Result<T> {
//!     let span = spans::my_operation(param_value);
//!     async {
//!         // Business logic here
//!     }
//!     .instrument(span)
//!     .await
//! }
//! ```
//!
//! Spans wrap the async body with [`tracing::Instrument`] rather than an
//! entered guard, which would pin the future to one thread across awaits.

use chrono::NaiveDate;
use tracing::Span;

use crate::types::{Granularity, SellerId};

/// Create span for computing per-period churn data over a range.
///
/// This is the engine's main entry point.
///
/// Parent: None, or churnscan.data_for_dates when invoked by the proxy
/// Children: paginate_churn_buckets, active_subscribers_on spans
#[inline]
pub(crate) fn by_date(
    seller: SellerId,
    granularity: Granularity,
    start: NaiveDate,
    end: NaiveDate,
) -> Span {
    tracing::info_span!(
        "churnscan.by_date",
        seller_id = %seller,
        granularity = granularity.as_str(),
        start = %start,
        end = %end,
    )
}

/// Create span for the cursor-pagination loop over churn-event buckets.
///
/// Parent: by_date span
/// Children: search-backend calls (one per page)
#[inline]
pub(crate) fn paginate_churn_buckets(seller: SellerId, page_size: usize) -> Span {
    tracing::debug_span!(
        "churnscan.paginate_churn_buckets",
        seller_id = %seller,
        page_size = page_size,
    )
}

/// Create span for counting active subscribers as of a cutoff date.
///
/// Parent: by_date span
/// Children: one search-backend cardinality call
#[inline]
pub(crate) fn active_subscribers_on(seller: SellerId, cutoff: NaiveDate) -> Span {
    tracing::debug_span!(
        "churnscan.active_subscribers_on",
        seller_id = %seller,
        cutoff = %cutoff,
    )
}

/// Create span for a cached dashboard read.
///
/// This is the proxy's main entry point.
///
/// Parent: None (root span for this operation)
/// Children: by_date spans for gap fills, cache-store calls
#[inline]
pub(crate) fn data_for_dates(
    seller: SellerId,
    granularity: Granularity,
    start: NaiveDate,
    end: NaiveDate,
) -> Span {
    tracing::info_span!(
        "churnscan.data_for_dates",
        seller_id = %seller,
        granularity = granularity.as_str(),
        start = %start,
        end = %end,
    )
}

/// Create span for bulk cache population of one seller.
///
/// Parent: None (root span for this operation)
/// Children: by_date spans (one per uncached period)
#[inline]
pub(crate) fn generate_cache(seller: SellerId) -> Span {
    tracing::info_span!("churnscan.generate_cache", seller_id = %seller)
}

/// Create span for targeted regeneration of a single cached period.
///
/// Parent: None, or the regeneration worker's span
/// Children: one by_date span
#[inline]
pub(crate) fn overwrite_cache(seller: SellerId, date: NaiveDate, granularity: Granularity) -> Span {
    tracing::info_span!(
        "churnscan.overwrite_cache",
        seller_id = %seller,
        date = %date,
        granularity = granularity.as_str(),
    )
}

/// Create span for one deduplicated regeneration job.
///
/// Parent: None (root span for the background job)
/// Children: overwrite_cache spans (one per granularity)
#[inline]
pub(crate) fn regenerate(seller: SellerId, date: NaiveDate) -> Span {
    tracing::info_span!(
        "churnscan.regenerate",
        seller_id = %seller,
        date = %date,
    )
}
