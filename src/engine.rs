//! Churn aggregation engine
//!
//! Turns a date range, product set, and granularity into per-period churn
//! statistics by querying the transactional-event search index. The engine
//! owns no persistent state: it is a pure function of its inputs against the
//! backend, which is what makes the caching proxy's gap fills idempotent.
//!
//! # Examples
//!
//! ```rust,ignore
//! use churnscan::{ChurnEngine, ChurnscanConfig, Granularity, ProductSet, SummaryStats};
//!
//! let engine = ChurnEngine::new(
//!     backend,
//!     seller,
//!     ProductSet::all(),
//!     Granularity::Daily,
//!     ChurnscanConfig::default(),
//! );
//!
//! let data = engine.by_date(start, end).await?;
//! let total = SummaryStats::from_periods(&data);
//! let comparison = engine.last_period_stats(start, end).await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn, Instrument};

use crate::config::ChurnscanConfig;
use crate::errors::{EngineError, SearchError};
use crate::search::{ActiveSubscribersQuery, ChurnBucket, ChurnEventsQuery, SearchBackend};
use crate::spans;
use crate::types::stats::round2;
use crate::types::{
    periods_for, ChurnData, DateRange, Granularity, PeriodKey, PeriodStats, ProductSet, Seller,
    SummaryStats,
};

/// Computes per-period churn statistics against a search backend
///
/// One engine instance is scoped to a (seller, product set, granularity)
/// triple; the date range varies per call. "Today" is captured at
/// construction in the seller's timezone and bounds every range.
pub struct ChurnEngine<S> {
    backend: Arc<S>,
    seller: Seller,
    products: ProductSet,
    granularity: Granularity,
    config: ChurnscanConfig,
    today: NaiveDate,
}

impl<S: SearchBackend> ChurnEngine<S> {
    pub fn new(
        backend: Arc<S>,
        seller: Seller,
        products: ProductSet,
        granularity: Granularity,
        config: ChurnscanConfig,
    ) -> Self {
        let today = seller.today();
        Self {
            backend,
            seller,
            products,
            granularity,
            config,
            today,
        }
    }

    /// Pins "today", overriding the clock-derived value
    ///
    /// Used by the proxy to keep engine and cache boundaries consistent
    /// within one request, and by tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn seller(&self) -> &Seller {
        &self.seller
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Per-period churn statistics for `[start, end]`
    ///
    /// The range is clamped to `[earliest_meaningful_date, today]`; a range
    /// that vanishes under clamping yields an empty map, not an error.
    /// Every period in the clamped range appears in the result, including
    /// periods with zero churn events, so consumers can render contiguous
    /// series without backfilling.
    pub async fn by_date(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ChurnData, EngineError> {
        let span = spans::by_date(self.seller.id, self.granularity, start, end);
        async {
            let Some(range) = self.constrain(start, end) else {
                debug!(start = %start, end = %end, "Range empty after clamping");
                return Ok(ChurnData::new());
            };

            let query = ChurnEventsQuery::new(
                &self.seller,
                &self.products,
                range,
                self.granularity,
                self.config.bucket_page_size,
            );
            let buckets = self.paginate(&query).await?;

            let mut churned: HashMap<PeriodKey, (u64, u64)> = HashMap::new();
            for bucket in buckets {
                let entry = churned.entry(bucket.period).or_insert((0, 0));
                entry.0 += bucket.churned_users;
                entry.1 += bucket.revenue_lost_cents;
            }

            // One query per period; a years-long fill must not put them all
            // in flight at once.
            let periods = periods_for(self.granularity, &range);
            let starts: Vec<NaiveDate> = periods.iter().map(|period| period.start).collect();
            let counts: Vec<u64> = stream::iter(
                starts
                    .into_iter()
                    .map(|start| self.active_subscribers_on(start)),
            )
            .buffered(self.config.active_query_concurrency.max(1))
            .try_collect()
            .await?;

            let mut data = ChurnData::new();
            for (period, active_subscribers) in periods.into_iter().zip(counts) {
                let (churned_users, revenue_lost_cents) =
                    churned.get(&period.key).copied().unwrap_or((0, 0));

                let churn_rate = if active_subscribers > 0 {
                    round2(churned_users as f64 / active_subscribers as f64 * 100.0)
                        .clamp(0.0, 100.0)
                } else {
                    0.0
                };

                data.insert(
                    period.key,
                    PeriodStats {
                        churned_users,
                        revenue_lost_cents,
                        churn_rate,
                        active_subscribers,
                    },
                );
            }

            Ok(data)
        }
        .instrument(span)
        .await
    }

    /// Summary statistics for `[start, end]`
    pub async fn total_stats(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SummaryStats, EngineError> {
        let data = self.by_date(start, end).await?;
        Ok(SummaryStats::from_periods(&data))
    }

    /// Summary statistics for the preceding range of equal day count
    ///
    /// The comparison window ends the day before `[start, end]` begins and
    /// spans the same number of days, which keeps month-over-month
    /// comparisons fair across uneven month lengths. Best-effort: a window
    /// that precedes the seller's history, or any failure while computing
    /// it, yields all-zero stats rather than an error.
    pub async fn last_period_stats(&self, start: NaiveDate, end: NaiveDate) -> SummaryStats {
        let Some(range) = self.constrain(start, end) else {
            return SummaryStats::zero();
        };
        let Some(previous) = range.preceding_of_equal_length() else {
            return SummaryStats::zero();
        };
        if previous.start() < self.seller.earliest_meaningful_date() {
            return SummaryStats::zero();
        }

        match self.total_stats(previous.start(), previous.end()).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(
                    seller_id = %self.seller.id,
                    previous = %previous,
                    error = %e,
                    "Failed to compute last-period churn stats"
                );
                SummaryStats::zero()
            }
        }
    }

    /// Distinct subscriptions alive as of the start of `cutoff`
    pub async fn active_subscribers_on(&self, cutoff: NaiveDate) -> Result<u64, EngineError> {
        let span = spans::active_subscribers_on(self.seller.id, cutoff);
        async {
            let query = ActiveSubscribersQuery::new(&self.seller, &self.products, cutoff);
            let count = self
                .bounded(self.backend.active_subscriber_count(&query))
                .await?;
            Ok(count)
        }
        .instrument(span)
        .await
    }

    /// Clamps a requested range to `[earliest_meaningful_date, today]`
    fn constrain(&self, start: NaiveDate, end: NaiveDate) -> Option<DateRange> {
        DateRange::clamped(
            start,
            end,
            self.seller.earliest_meaningful_date(),
            self.today,
        )
    }

    /// Drains the composite aggregation page by page
    ///
    /// Terminates on the first page shorter than the query's page size, or
    /// when the backend stops returning a cursor. Every bucket key is
    /// checked against the requested granularity before it is trusted.
    async fn paginate(&self, query: &ChurnEventsQuery) -> Result<Vec<ChurnBucket>, EngineError> {
        let span = spans::paginate_churn_buckets(self.seller.id, query.page_size);
        async {
            let mut buckets = Vec::new();
            let mut after = None;
            loop {
                let page = self
                    .bounded(self.backend.churn_buckets(query, after.as_ref()))
                    .await?;
                for bucket in &page.buckets {
                    self.check_bucket(bucket)?;
                }
                let short = page.buckets.len() < query.page_size;
                buckets.extend(page.buckets);
                if short || page.after.is_none() {
                    break;
                }
                after = page.after;
            }

            debug!(buckets = buckets.len(), "Drained churn-event buckets");
            Ok(buckets)
        }
        .instrument(span)
        .await
    }

    /// Rejects histogram buckets whose key does not fit the requested
    /// granularity; such a bucket would silently vanish from the result
    fn check_bucket(&self, bucket: &ChurnBucket) -> Result<(), EngineError> {
        let key = bucket.period.as_str();
        let well_formed = match self.granularity {
            Granularity::Daily => NaiveDate::parse_from_str(key, "%Y-%m-%d").is_ok(),
            Granularity::Monthly => {
                key.len() == 7 && NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d").is_ok()
            }
        };
        if well_formed {
            Ok(())
        } else {
            Err(EngineError::inconsistent_aggregation(format!(
                "bucket key {key:?} does not fit a {} histogram",
                self.granularity
            )))
        }
    }

    /// Applies the configured search timeout to one backend call
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SearchError>>,
    ) -> Result<T, SearchError> {
        tokio::time::timeout(self.config.search_timeout, call)
            .await
            .map_err(|_| SearchError::timeout(self.config.search_timeout))?
    }
}
