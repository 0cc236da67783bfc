//! Process-wide configuration for churn analytics
//!
//! All tunables that the engine, proxy, and background jobs read are gathered
//! here and passed explicitly at construction time. There is no hidden global
//! state: bumping [`ChurnscanConfig::cache_version`] is how every cache entry
//! is invalidated at once (old keys simply stop being looked up).
//!
//! # Examples
//!
//! ```
//! use churnscan::ChurnscanConfig;
//! use std::time::Duration;
//!
//! let config = ChurnscanConfig::default()
//!     .with_cache_version(3)
//!     .with_search_timeout(Duration::from_secs(10));
//!
//! assert_eq!(config.cache_version, 3);
//! ```

use std::time::Duration;

/// Default composite-aggregation page size, matching the search backend's
/// maximum bucket response limit.
pub const DEFAULT_BUCKET_PAGE_SIZE: usize = 10_000;

/// Default number of trailing days that are never cached (today and the day
/// before, in the seller's timezone).
pub const DEFAULT_LIVE_WINDOW_DAYS: u64 = 2;

/// Default cap on concurrent active-subscriber queries per range
/// computation.
pub const DEFAULT_ACTIVE_QUERY_CONCURRENCY: usize = 8;

/// Configuration values shared by the engine, the caching proxy, and jobs
#[derive(Debug, Clone)]
pub struct ChurnscanConfig {
    /// Global cache-format version embedded in every cache key.
    ///
    /// Incrementing this invalidates all existing entries without deleting
    /// them.
    pub cache_version: u64,

    /// Page size for cursor-based pagination over composite aggregation
    /// buckets. A response shorter than this terminates the pagination loop.
    pub bucket_page_size: usize,

    /// Number of trailing days excluded from caching. With the default of 2,
    /// today and yesterday are always recomputed live.
    pub live_window_days: u64,

    /// Cap on concurrent active-subscriber queries while computing one
    /// range. One query is issued per period, so without a bound a
    /// years-long backfill gap would put hundreds of cardinality queries
    /// in flight at once.
    pub active_query_concurrency: usize,

    /// Upper bound on a single search-backend call.
    pub search_timeout: Duration,

    /// Ceiling on one cache-regeneration job. Generous because regeneration
    /// paginates aggregations over potentially years of history.
    pub regeneration_timeout: Duration,

    /// Buffer between a subscription-state change and the regeneration it
    /// triggers, so rapid successive writes collapse into one run.
    pub regeneration_delay: Duration,
}

impl Default for ChurnscanConfig {
    fn default() -> Self {
        Self {
            cache_version: 0,
            bucket_page_size: DEFAULT_BUCKET_PAGE_SIZE,
            live_window_days: DEFAULT_LIVE_WINDOW_DAYS,
            active_query_concurrency: DEFAULT_ACTIVE_QUERY_CONCURRENCY,
            search_timeout: Duration::from_secs(30),
            regeneration_timeout: Duration::from_secs(20 * 60),
            regeneration_delay: Duration::from_secs(2),
        }
    }
}

impl ChurnscanConfig {
    /// Sets the global cache-format version
    pub fn with_cache_version(mut self, version: u64) -> Self {
        self.cache_version = version;
        self
    }

    /// Sets the composite-aggregation page size
    pub fn with_bucket_page_size(mut self, size: usize) -> Self {
        self.bucket_page_size = size;
        self
    }

    /// Sets the cap on concurrent active-subscriber queries
    pub fn with_active_query_concurrency(mut self, concurrency: usize) -> Self {
        self.active_query_concurrency = concurrency;
        self
    }

    /// Sets the per-call search timeout
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Sets the regeneration job ceiling
    pub fn with_regeneration_timeout(mut self, timeout: Duration) -> Self {
        self.regeneration_timeout = timeout;
        self
    }

    /// Sets the trigger debounce delay
    pub fn with_regeneration_delay(mut self, delay: Duration) -> Self {
        self.regeneration_delay = delay;
        self
    }
}
