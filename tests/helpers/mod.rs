//! Shared fixtures: a scripted subscription ledger behind the search trait
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use churnscan::search::{
    ActiveSubscribersQuery, BucketPage, ChurnBucket, ChurnEventsQuery, CompositeCursor,
    SearchBackend,
};
use churnscan::types::{PeriodKey, ProductSet, Seller, SellerId};
use churnscan::{ChurnscanConfig, SearchError};

/// One subscription as the search index sees it
#[derive(Debug, Clone)]
pub struct Subscription {
    pub seller_id: u64,
    pub subscription_id: u64,
    pub product_id: u64,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub price_cents: u64,
}

/// Subscription created at noon UTC on `created`, optionally deactivated at
/// noon UTC on `deactivated`
pub fn sub(
    seller_id: u64,
    subscription_id: u64,
    product_id: u64,
    created: NaiveDate,
    deactivated: Option<NaiveDate>,
    price_cents: u64,
) -> Subscription {
    Subscription {
        seller_id,
        subscription_id,
        product_id,
        created_at: noon(created),
        deactivated_at: deactivated.map(noon),
        price_cents,
    }
}

pub fn noon(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Search backend interpreting the typed queries over an in-memory ledger
///
/// Honors the seller and product filters, the deactivation-date range, the
/// active-subscriber cutoff instant, and cursor pagination at the query's
/// page size, so the engine's pagination loop is exercised for real.
pub struct MockSearchBackend {
    subs: Vec<Subscription>,
    /// Pages served by `churn_buckets`
    pub churn_pages: AtomicU64,
    /// Calls to `active_subscriber_count`
    pub active_calls: AtomicU64,
    /// Active-subscriber queries currently in flight
    pub active_in_flight: AtomicU64,
    /// High-water mark of concurrent active-subscriber queries
    pub active_max_in_flight: AtomicU64,
    active_delay_ms: AtomicU64,
    fail_churn_queries: AtomicU64,
    extra_buckets: Mutex<Vec<ChurnBucket>>,
}

impl MockSearchBackend {
    pub fn new(subs: Vec<Subscription>) -> Self {
        Self {
            subs,
            churn_pages: AtomicU64::new(0),
            active_calls: AtomicU64::new(0),
            active_in_flight: AtomicU64::new(0),
            active_max_in_flight: AtomicU64::new(0),
            active_delay_ms: AtomicU64::new(0),
            fail_churn_queries: AtomicU64::new(0),
            extra_buckets: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next `n` churn-bucket pages fail as unavailable
    pub fn fail_next_churn_queries(&self, n: u64) {
        self.fail_churn_queries.store(n, Ordering::SeqCst);
    }

    /// Holds each active-subscriber query open for `ms`, so concurrent
    /// queries overlap and `active_max_in_flight` becomes observable
    pub fn set_active_delay_ms(&self, ms: u64) {
        self.active_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Appends a bucket to every churn-bucket response, regardless of the
    /// query
    pub fn inject_bucket(&self, bucket: ChurnBucket) {
        self.extra_buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(bucket);
    }

    fn offset(raw: &str) -> FixedOffset {
        raw.parse().unwrap_or_else(|_| FixedOffset::east_opt(0).unwrap())
    }

    fn product_matches(products: &ProductSet, product_id: u64) -> bool {
        products.is_empty() || products.ids().iter().any(|p| p.0 == product_id)
    }

    /// All buckets for the query, in period-key order
    fn buckets_for(&self, query: &ChurnEventsQuery) -> Vec<ChurnBucket> {
        let offset = Self::offset(&query.timezone_offset);
        let mut buckets: BTreeMap<PeriodKey, (u64, u64)> = BTreeMap::new();

        for sub in &self.subs {
            if sub.seller_id != query.seller_id.0
                || !Self::product_matches(&query.products, sub.product_id)
            {
                continue;
            }
            let Some(deactivated_at) = sub.deactivated_at else {
                continue;
            };

            let local_date = deactivated_at.with_timezone(&offset).date_naive();
            if !query.range.contains(local_date) {
                continue;
            }

            let key = query.granularity.period_key(local_date);
            let entry = buckets.entry(key).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += sub.price_cents;
        }

        buckets
            .into_iter()
            .map(|(period, (churned_users, revenue_lost_cents))| ChurnBucket {
                period,
                churned_users,
                revenue_lost_cents,
            })
            .collect()
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn churn_buckets(
        &self,
        query: &ChurnEventsQuery,
        after: Option<&CompositeCursor>,
    ) -> Result<BucketPage, SearchError> {
        self.churn_pages.fetch_add(1, Ordering::SeqCst);
        if self.fail_churn_queries.load(Ordering::SeqCst) > 0 {
            self.fail_churn_queries.fetch_sub(1, Ordering::SeqCst);
            return Err(SearchError::unavailable("scripted failure"));
        }

        let mut all = self.buckets_for(query);
        all.extend(
            self.extra_buckets
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .iter()
                .cloned(),
        );
        let start: usize = after
            .map(|cursor| cursor.0.parse().map_err(|_| SearchError::invalid_response("bad cursor")))
            .transpose()?
            .unwrap_or(0);

        let end = (start + query.page_size).min(all.len());
        let buckets = all[start..end].to_vec();
        let next = (end < all.len()).then(|| CompositeCursor(end.to_string()));

        Ok(BucketPage {
            buckets,
            after: next,
        })
    }

    async fn active_subscriber_count(
        &self,
        query: &ActiveSubscribersQuery,
    ) -> Result<u64, SearchError> {
        self.active_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.active_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.active_max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let delay = self.active_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.active_in_flight.fetch_sub(1, Ordering::SeqCst);

        let cutoff = DateTime::parse_from_rfc3339(&query.cutoff_instant())
            .map_err(|e| SearchError::invalid_response(format!("bad cutoff instant: {e}")))?
            .with_timezone(&Utc);

        let active: HashSet<u64> = self
            .subs
            .iter()
            .filter(|sub| {
                sub.seller_id == query.seller_id.0
                    && Self::product_matches(&query.products, sub.product_id)
                    && sub.created_at < cutoff
                    && sub.deactivated_at.map_or(true, |at| at >= cutoff)
            })
            .map(|sub| sub.subscription_id)
            .collect();

        Ok(active.len() as u64)
    }
}

/// Large subscription seller in UTC with a first sale on `first_sale`
pub fn cacheable_seller(id: u64, first_sale: NaiveDate) -> Seller {
    Seller::new(SellerId(id), chrono_tz::UTC)
        .with_created_at(noon(first_sale) - chrono::Days::new(30))
        .with_first_sale_at(noon(first_sale))
        .with_large_seller(true)
        .with_subscription_sales(true)
}

/// Config with a fast debounce, suitable for scheduler tests
pub fn test_config() -> ChurnscanConfig {
    ChurnscanConfig::default().with_regeneration_delay(std::time::Duration::from_millis(5))
}

/// Ten subscribers created on `start`, one of whom churns on `churn_date`
/// losing 1000 cents
pub fn ten_subscribers_one_churn(
    seller_id: u64,
    start: NaiveDate,
    churn_date: NaiveDate,
) -> Vec<Subscription> {
    (1..=10)
        .map(|n| {
            let deactivated = (n == 1).then_some(churn_date);
            sub(seller_id, n, 1, start, deactivated, 1000)
        })
        .collect()
}
