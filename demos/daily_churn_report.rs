/// Example building a daily churn report through the caching proxy
///
/// This example shows how to:
/// 1. Plug a search backend into ChurnCachingProxy with a MemoryStore
/// 2. Populate the cache for every settled period with generate_cache
/// 3. Build the consumer-facing report with churn_report
///
/// The backend here is scripted from a small in-memory subscription ledger
/// so the example runs offline; a real deployment implements SearchBackend
/// against the transactional-event search index.
///
/// Run with:
/// ```bash
/// START=2024-01-10 \
/// END=2024-01-20 \
/// cargo run --example daily_churn_report
/// ```
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use churnscan::search::{
    ActiveSubscribersQuery, BucketPage, ChurnBucket, ChurnEventsQuery, CompositeCursor,
    SearchBackend,
};
use churnscan::types::{Granularity, PeriodKey, Seller, SellerId};
use churnscan::{
    churn_report, CacheStore, ChurnCachingProxy, ChurnscanConfig, MemoryStore, ProductSelection,
    SearchError, TimeRangeParams,
};

/// One subscription as the search index would see it
struct Subscription {
    subscription_id: u64,
    created_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
    price_cents: u64,
}

/// Search backend scripted from an in-memory ledger, single-page responses
struct LedgerBackend {
    subs: Vec<Subscription>,
}

#[async_trait]
impl SearchBackend for LedgerBackend {
    async fn churn_buckets(
        &self,
        query: &ChurnEventsQuery,
        _after: Option<&CompositeCursor>,
    ) -> Result<BucketPage, SearchError> {
        let mut buckets: BTreeMap<PeriodKey, (u64, u64)> = BTreeMap::new();
        for sub in &self.subs {
            let Some(deactivated_at) = sub.deactivated_at else {
                continue;
            };
            let date = deactivated_at.date_naive();
            if !query.range.contains(date) {
                continue;
            }
            let entry = buckets
                .entry(query.granularity.period_key(date))
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 += sub.price_cents;
        }

        Ok(BucketPage {
            buckets: buckets
                .into_iter()
                .map(|(period, (churned_users, revenue_lost_cents))| ChurnBucket {
                    period,
                    churned_users,
                    revenue_lost_cents,
                })
                .collect(),
            after: None,
        })
    }

    async fn active_subscriber_count(
        &self,
        query: &ActiveSubscribersQuery,
    ) -> Result<u64, SearchError> {
        let cutoff = DateTime::parse_from_rfc3339(&query.cutoff_instant())
            .map_err(|e| SearchError::invalid_response(format!("bad cutoff instant: {e}")))?
            .with_timezone(&Utc);

        let active: HashSet<u64> = self
            .subs
            .iter()
            .filter(|sub| {
                sub.created_at < cutoff && sub.deactivated_at.map_or(true, |at| at >= cutoff)
            })
            .map(|sub| sub.subscription_id)
            .collect();

        Ok(active.len() as u64)
    }
}

fn noon(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let start = env::var("START").unwrap_or_else(|_| "2024-01-10".to_string());
    let end = env::var("END").unwrap_or_else(|_| "2024-01-20".to_string());

    info!(start, end, "Starting daily churn report example");

    // Ten subscribers from January 9th; one churns on the 15th.
    let first_sale = NaiveDate::from_ymd_opt(2024, 1, 10)
        .context("Failed to build the first-sale date")?;
    let subs = (1..=10)
        .map(|n| Subscription {
            subscription_id: n,
            created_at: noon(first_sale - chrono::Days::new(1)),
            deactivated_at: (n == 1)
                .then(|| noon(first_sale + chrono::Days::new(5))),
            price_cents: 1000,
        })
        .collect();
    let backend = Arc::new(LedgerBackend { subs });

    let seller = Seller::new(SellerId(1), chrono_tz::UTC)
        .with_created_at(noon(first_sale) - chrono::Days::new(30))
        .with_first_sale_at(noon(first_sale))
        .with_large_seller(true)
        .with_subscription_sales(true);

    let store = Arc::new(MemoryStore::new());
    let proxy = ChurnCachingProxy::new(
        backend,
        store.clone(),
        seller,
        ChurnscanConfig::default(),
    )
    .with_today(
        NaiveDate::from_ymd_opt(2024, 2, 1).context("Failed to build the pinned today")?,
    );

    // Populate every settled period up front, the way the nightly job does.
    let written = proxy.generate_cache().await?;
    let stats = store.stats().await;
    info!(written, %stats, "Cache populated");

    let params = TimeRangeParams::new(start, end);
    let report = churn_report(&proxy, &params, Granularity::Daily, &ProductSelection::All).await?;

    println!("\n=== Daily Churn Report ===");
    for (i, label) in report.dates.iter().enumerate() {
        println!(
            "{label}: {:.2}% churn, {} churned, {} cents lost",
            report.by_date.churn_rate[i],
            report.by_date.churned_users[i],
            report.by_date.revenue_lost_cents[i],
        );
    }
    println!(
        "Total: {:.2}% churn, {} churned, {} cents lost, avg base {}",
        report.total.churn_rate,
        report.total.churned_users,
        report.total.revenue_lost_cents,
        report.total.avg_active_base,
    );
    println!(
        "Last period: {:.2}% churn, {} churned",
        report.last_period.churn_rate, report.last_period.churned_users,
    );

    Ok(())
}
