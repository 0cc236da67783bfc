//! Caching proxy over the churn aggregation engine
//!
//! Dashboard reads go through [`ChurnCachingProxy`], which serves fully
//! settled periods from a [`CacheStore`] and recomputes the rest live:
//!
//! 1. Enumerate the periods of the requested range and batch-read their keys
//! 2. Group the misses into contiguous gaps ([`gaps::missing_ranges`])
//! 3. Fill each gap with one engine invocation and persist the settled slices
//! 4. Merge cached and fresh periods into one result
//!
//! The trailing live window (today and the day before, by default) is never
//! cached: deactivations can still arrive for those dates, and a written
//! entry would otherwise serve stale numbers forever. Product-scoped reads
//! bypass the cache entirely, as do sellers below the caching threshold.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn, Instrument};

use crate::cache::{
    cache_key, decode_entry, encode_entry, CacheKey, CacheStore, MemoryStore, NoOpStore,
};
use crate::config::ChurnscanConfig;
use crate::engine::ChurnEngine;
use crate::errors::ChurnscanError;
use crate::search::SearchBackend;
use crate::spans;
use crate::types::{
    beginning_of_month, end_of_month, periods_for, ChurnData, DateRange, Granularity, Period,
    ProductSet, Seller,
};

pub mod gaps;

pub use gaps::{missing_ranges, Gap};

/// Whether a read may be served through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Seller qualifies; cache-eligible periods are served from the store
    CacheEligible,
    /// Every period is recomputed live
    Bypass,
}

/// Cache-aware front door for per-period churn statistics
///
/// One proxy instance is scoped to a seller; granularity and products vary
/// per call. "Today" is captured at construction and shared with every
/// engine the proxy creates, so cache-eligibility boundaries stay consistent
/// within a request even across midnight.
///
/// # Examples
///
/// ```rust,ignore
/// use churnscan::{ChurnCachingProxy, ChurnscanConfig, Granularity, ProductSet};
///
/// let proxy = ChurnCachingProxy::with_memory_store(backend, seller, ChurnscanConfig::default());
/// let data = proxy
///     .data_for_dates(start, end, Granularity::Daily, &ProductSet::all())
///     .await?;
/// ```
pub struct ChurnCachingProxy<S> {
    backend: Arc<S>,
    store: Arc<dyn CacheStore>,
    seller: Seller,
    config: ChurnscanConfig,
    today: NaiveDate,
}

impl<S: SearchBackend> ChurnCachingProxy<S> {
    pub fn new(
        backend: Arc<S>,
        store: Arc<dyn CacheStore>,
        seller: Seller,
        config: ChurnscanConfig,
    ) -> Self {
        let today = seller.today();
        Self {
            backend,
            store,
            seller,
            config,
            today,
        }
    }

    /// Proxy over a fresh in-memory store
    pub fn with_memory_store(backend: Arc<S>, seller: Seller, config: ChurnscanConfig) -> Self {
        Self::new(backend, Arc::new(MemoryStore::new()), seller, config)
    }

    /// Proxy with caching disabled
    pub fn without_cache(backend: Arc<S>, seller: Seller, config: ChurnscanConfig) -> Self {
        Self::new(backend, Arc::new(NoOpStore::new()), seller, config)
    }

    /// Pins "today", overriding the clock-derived value
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

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Whether this seller's reads may be served through the cache
    ///
    /// Only high-volume subscription sellers qualify; for everyone else the
    /// live computation is cheap enough that cache maintenance costs more
    /// than it saves.
    pub fn strategy(&self) -> CacheStrategy {
        if self.seller.large_seller && self.seller.has_subscription_sales {
            CacheStrategy::CacheEligible
        } else {
            CacheStrategy::Bypass
        }
    }

    /// Most recent date whose statistics may be cached
    ///
    /// Dates after this fall in the live window and are always recomputed.
    pub fn last_date_to_cache(&self) -> NaiveDate {
        self.today - Days::new(self.config.live_window_days)
    }

    /// Whether the period of `date` at `granularity` has fully settled
    ///
    /// A monthly period is cacheable only once its last day has left the
    /// live window; a half-elapsed month cached early would go stale.
    pub fn cacheable(&self, granularity: Granularity, date: NaiveDate) -> bool {
        let settled = match granularity {
            Granularity::Daily => date,
            Granularity::Monthly => end_of_month(date),
        };
        settled <= self.last_date_to_cache()
    }

    /// Builds an engine sharing this proxy's seller, clock, and config
    pub fn engine(&self, products: ProductSet, granularity: Granularity) -> ChurnEngine<S> {
        ChurnEngine::new(
            Arc::clone(&self.backend),
            self.seller.clone(),
            products,
            granularity,
            self.config.clone(),
        )
        .with_today(self.today)
    }

    /// Per-period churn statistics, served through the cache where possible
    ///
    /// Product-scoped reads and reads for non-eligible sellers bypass the
    /// cache entirely. For eligible reads, a store failure degrades to a
    /// full live recomputation rather than failing the request, and settled
    /// periods recomputed for a gap are persisted on the way out.
    pub async fn data_for_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        products: &ProductSet,
    ) -> Result<ChurnData, ChurnscanError> {
        let span = spans::data_for_dates(self.seller.id, granularity, start, end);
        async {
            if !products.is_empty() || self.strategy() == CacheStrategy::Bypass {
                debug!("Bypassing churn cache");
                let engine = self.engine(products.clone(), granularity);
                return engine.by_date(start, end).await.map_err(Into::into);
            }

            let Some(range) = DateRange::clamped(
                start,
                end,
                self.seller.earliest_meaningful_date(),
                self.today,
            ) else {
                return Ok(ChurnData::new());
            };

            let periods = periods_for(granularity, &range);
            let (mut merged, lookups) = self.read_cached(granularity, &periods).await;

            let engine = self.engine(ProductSet::all(), granularity);
            for gap in missing_ranges(&lookups, granularity) {
                let fill = self.fill_range(granularity, gap);
                let fresh = engine.by_date(fill.start(), fill.end()).await?;
                self.persist_settled(granularity, &fill, &fresh).await;
                for (key, stats) in fresh {
                    // Cached entries win; a gap expanded to month boundaries can
                    // brush periods already merged.
                    merged.entry(key).or_insert(stats);
                }
            }

            Ok(merged)
        }
        .instrument(span)
        .await
    }

    /// Populates every missing cache entry across the seller's history
    ///
    /// Covers both granularities from the earliest meaningful date through
    /// the last cacheable date, filling only the gaps. Suspended sellers and
    /// sellers with no sales yet have no cacheable history and write
    /// nothing. Returns the number of entries written.
    pub async fn generate_cache(&self) -> Result<u64, ChurnscanError> {
        let span = spans::generate_cache(self.seller.id);
        async {
            if self.seller.suspended || self.seller.first_sale_at.is_none() {
                debug!("Seller has no cacheable history, skipping population");
                return Ok(0);
            }

            let mut written = 0;
            for granularity in [Granularity::Monthly, Granularity::Daily] {
                written += self.backfill(granularity).await?;
            }

            info!(written, "Populated churn cache");
            Ok(written)
        }
        .instrument(span)
        .await
    }

    /// Recomputes and rewrites the cache entry holding `date`
    ///
    /// Unconditional overwrite: this is how entries invalidated by late
    /// subscription-state changes get corrected. Returns `false` without
    /// touching the store for sellers whose reads bypass the cache, when the
    /// period has not settled yet, or when the period lies entirely outside
    /// the seller's meaningful history.
    pub async fn overwrite_cache(
        &self,
        date: NaiveDate,
        granularity: Granularity,
    ) -> Result<bool, ChurnscanError> {
        let span = spans::overwrite_cache(self.seller.id, date, granularity);
        async {
            if self.strategy() == CacheStrategy::Bypass {
                debug!("Seller is not cache-eligible, skipping overwrite");
                return Ok(false);
            }
            if !self.cacheable(granularity, date) {
                debug!("Period still live, skipping overwrite");
                return Ok(false);
            }

            // Monthly entries always hold the full calendar month.
            let (start, end) = match granularity {
                Granularity::Daily => (date, date),
                Granularity::Monthly => (beginning_of_month(date), end_of_month(date)),
            };

            let engine = self.engine(ProductSet::all(), granularity);
            let fresh = engine.by_date(start, end).await?;

            let period_key = granularity.period_key(date);
            let Some(stats) = fresh.get(&period_key) else {
                debug!(period = %period_key, "Period outside meaningful history, skipping overwrite");
                return Ok(false);
            };

            let mut slice = ChurnData::new();
            slice.insert(period_key, stats.clone());

            let key = cache_key(self.config.cache_version, &self.seller, granularity, date);
            let blob = encode_entry(&slice)?;
            self.store.upsert(key, blob).await?;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Batch-reads the cacheable periods, returning the decoded hits and a
    /// per-period hit/miss sequence for gap grouping
    ///
    /// Live-window periods are never looked up and always read as misses.
    /// Store failures and corrupt entries read as misses too.
    async fn read_cached(
        &self,
        granularity: Granularity,
        periods: &[Period],
    ) -> (ChurnData, Vec<(NaiveDate, bool)>) {
        let keyed: Vec<(&Period, Option<CacheKey>)> = periods
            .iter()
            .map(|period| {
                let key = self.cacheable(granularity, period.start).then(|| {
                    cache_key(
                        self.config.cache_version,
                        &self.seller,
                        granularity,
                        period.start,
                    )
                });
                (period, key)
            })
            .collect();

        let keys: Vec<CacheKey> = keyed.iter().filter_map(|(_, k)| k.clone()).collect();
        let found = if keys.is_empty() {
            HashMap::new()
        } else {
            match self.store.batch_get(&keys).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(
                        store = self.store.name(),
                        error = %e,
                        "Cache store read failed, recomputing all periods"
                    );
                    HashMap::new()
                }
            }
        };

        let mut merged = ChurnData::new();
        let mut lookups = Vec::with_capacity(periods.len());
        for (period, key) in keyed {
            let decoded = key
                .and_then(|k| found.get(&k).map(|blob| (k, blob)))
                .and_then(|(k, blob)| decode_entry(&k, blob));

            match decoded {
                Some(data) => {
                    merged.extend(data);
                    lookups.push((period.start, true));
                }
                None => lookups.push((period.start, false)),
            }
        }

        (merged, lookups)
    }

    /// Expands a gap to the full periods it covers
    ///
    /// Monthly gaps recompute whole calendar months so the persisted entry
    /// matches what an overwrite would produce. The engine clamps the
    /// expansion back to the seller's history and today.
    fn fill_range(&self, granularity: Granularity, gap: Gap) -> DateRange {
        match granularity {
            Granularity::Daily => DateRange::new(gap.start, gap.end),
            Granularity::Monthly => {
                DateRange::new(beginning_of_month(gap.start), end_of_month(gap.end))
            }
        }
        // Gaps come out of missing_ranges ordered, so start <= end holds.
        .unwrap_or_else(|| DateRange::single(gap.start))
    }

    /// Persists each settled period of freshly computed data, best effort
    ///
    /// Write failures are logged and skipped: the data is already in hand
    /// and the next read will simply refill the gap. Returns the number of
    /// entries written.
    async fn persist_settled(
        &self,
        granularity: Granularity,
        fill: &DateRange,
        fresh: &ChurnData,
    ) -> u64 {
        let mut written = 0;
        for period in periods_for(granularity, fill) {
            if !self.cacheable(granularity, period.start) {
                continue;
            }
            let Some(stats) = fresh.get(&period.key) else {
                continue;
            };

            let mut slice = ChurnData::new();
            slice.insert(period.key.clone(), stats.clone());
            let blob = match encode_entry(&slice) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(period = %period.key, error = %e, "Failed to encode cache entry");
                    continue;
                }
            };

            let key = cache_key(
                self.config.cache_version,
                &self.seller,
                granularity,
                period.start,
            );
            match self.store.upsert(key, blob).await {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(period = %period.key, error = %e, "Failed to persist cache entry");
                }
            }
        }

        if written > 0 {
            debug!(written, "Persisted settled churn periods");
        }
        written
    }

    /// Fills every cache gap for one granularity across the seller's history
    async fn backfill(&self, granularity: Granularity) -> Result<u64, ChurnscanError> {
        let earliest = self.seller.earliest_meaningful_date();
        let Some(range) = DateRange::new(earliest, self.last_date_to_cache()) else {
            debug!(granularity = %granularity, "No settled history to cache yet");
            return Ok(0);
        };

        // Unsettled periods (the trailing incomplete month) would be
        // recomputed and then dropped, so leave them out entirely.
        let periods: Vec<Period> = periods_for(granularity, &range)
            .into_iter()
            .filter(|period| self.cacheable(granularity, period.start))
            .collect();
        let (_, lookups) = self.read_cached(granularity, &periods).await;

        let engine = self.engine(ProductSet::all(), granularity);
        let mut written = 0;
        for gap in missing_ranges(&lookups, granularity) {
            let fill = self.fill_range(granularity, gap);
            let fresh = engine.by_date(fill.start(), fill.end()).await?;
            written += self.persist_settled(granularity, &fill, &fresh).await;
        }

        debug!(granularity = %granularity, written, "Backfilled churn cache");
        Ok(written)
    }
}
