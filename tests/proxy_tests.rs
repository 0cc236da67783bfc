//! Caching-proxy semantics: gap fills, live window, overwrites, maintenance

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use churnscan::cache::{cache_key, decode_entry, encode_entry, CacheStore, MemoryStore};
use churnscan::jobs::{generate_all_caches, CacheRegenerator, RegenerationScheduler};
use churnscan::types::{ChurnData, Granularity, PeriodStats, ProductId, Seller, SellerId};
use churnscan::{CacheStrategy, ChurnCachingProxy, ChurnscanConfig};

use helpers::{cacheable_seller, d, sub, ten_subscribers_one_churn, test_config, MockSearchBackend};

fn proxy_with(
    backend: Arc<MockSearchBackend>,
    store: Arc<dyn CacheStore>,
    seller: Seller,
    today: chrono::NaiveDate,
) -> ChurnCachingProxy<MockSearchBackend> {
    ChurnCachingProxy::new(backend, store, seller, ChurnscanConfig::default()).with_today(today)
}

/// Cache blob holding recognizable sentinel stats for one period
fn sentinel_blob(granularity: Granularity, date: chrono::NaiveDate, churned: u64) -> String {
    let mut data = ChurnData::new();
    data.insert(
        granularity.period_key(date),
        PeriodStats {
            churned_users: churned,
            revenue_lost_cents: churned * 100,
            churn_rate: 1.23,
            active_subscribers: 77,
        },
    );
    encode_entry(&data).unwrap()
}

#[tokio::test]
async fn fully_cached_range_is_served_verbatim_without_backend_calls() {
    let seller = cacheable_seller(1, d(2023, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    for month in [d(2024, 1, 1), d(2024, 2, 1), d(2024, 3, 1)] {
        store
            .upsert(
                cache_key(0, &seller, Granularity::Monthly, month),
                sentinel_blob(Granularity::Monthly, month, 40 + month.format("%m").to_string().parse::<u64>().unwrap()),
            )
            .await
            .unwrap();
    }

    let backend = Arc::new(MockSearchBackend::new(vec![]));
    let proxy = proxy_with(Arc::clone(&backend), store, seller, d(2024, 6, 15));

    let data = proxy
        .data_for_dates(d(2024, 1, 1), d(2024, 3, 31), Granularity::Monthly, &Default::default())
        .await
        .unwrap();

    assert_eq!(data.len(), 3);
    assert_eq!(data[&Granularity::Monthly.period_key(d(2024, 1, 1))].churned_users, 41);
    assert_eq!(data[&Granularity::Monthly.period_key(d(2024, 2, 1))].churned_users, 42);
    assert_eq!(data[&Granularity::Monthly.period_key(d(2024, 3, 1))].churned_users, 43);

    assert_eq!(backend.churn_pages.load(Ordering::SeqCst), 0);
    assert_eq!(backend.active_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_month_between_cached_months_is_the_only_gap() {
    let seller = cacheable_seller(1, d(2023, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    // January and March cached; February must be computed.
    for month in [d(2024, 1, 1), d(2024, 3, 1)] {
        store
            .upsert(
                cache_key(0, &seller, Granularity::Monthly, month),
                sentinel_blob(Granularity::Monthly, month, 42),
            )
            .await
            .unwrap();
    }

    let subs = vec![
        sub(1, 1, 1, d(2023, 1, 1), Some(d(2024, 2, 10)), 800),
        sub(1, 2, 1, d(2023, 1, 1), None, 500),
        sub(1, 3, 1, d(2023, 1, 1), None, 500),
        sub(1, 4, 1, d(2023, 1, 1), None, 500),
    ];
    let backend = Arc::new(MockSearchBackend::new(subs));
    let proxy = proxy_with(Arc::clone(&backend), Arc::clone(&store), seller, d(2024, 6, 15));

    let data = proxy
        .data_for_dates(d(2024, 1, 1), d(2024, 3, 31), Granularity::Monthly, &Default::default())
        .await
        .unwrap();

    // Cached months keep their sentinel values; February is live data.
    assert_eq!(data[&Granularity::Monthly.period_key(d(2024, 1, 1))].churned_users, 42);
    assert_eq!(data[&Granularity::Monthly.period_key(d(2024, 3, 1))].churned_users, 42);
    let february = &data[&Granularity::Monthly.period_key(d(2024, 2, 1))];
    assert_eq!(february.churned_users, 1);
    assert_eq!(february.revenue_lost_cents, 800);
    assert_eq!(february.active_subscribers, 4);
    assert_eq!(february.churn_rate, 25.0);

    // Exactly one period was recomputed, and its entry was written through.
    assert_eq!(backend.active_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.stats().await.entries, 3);
}

#[tokio::test]
async fn live_window_is_never_cached_and_settled_periods_are_reused() {
    let seller = cacheable_seller(1, d(2024, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockSearchBackend::new(ten_subscribers_one_churn(
        1,
        d(2023, 12, 20),
        d(2024, 1, 15),
    )));
    let today = d(2024, 1, 20);
    let proxy = proxy_with(Arc::clone(&backend), Arc::clone(&store), seller.clone(), today);

    let first = proxy
        .data_for_dates(d(2024, 1, 10), d(2024, 1, 20), Granularity::Daily, &Default::default())
        .await
        .unwrap();
    assert_eq!(first.len(), 11);

    // Only the nine settled days were written; today and yesterday never are.
    assert_eq!(store.stats().await.entries, 9);
    let live_keys = [
        cache_key(0, &seller, Granularity::Daily, d(2024, 1, 19)),
        cache_key(0, &seller, Granularity::Daily, d(2024, 1, 20)),
    ];
    assert!(store.batch_get(&live_keys).await.unwrap().is_empty());

    // A second identical request recomputes only the live window.
    let pages_before = backend.churn_pages.load(Ordering::SeqCst);
    let second = proxy
        .data_for_dates(d(2024, 1, 10), d(2024, 1, 20), Granularity::Daily, &Default::default())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(backend.churn_pages.load(Ordering::SeqCst), pages_before + 1);
    assert_eq!(store.stats().await.entries, 9);
}

#[tokio::test]
async fn overwrite_reflects_only_the_latest_computation() {
    let seller = cacheable_seller(1, d(2024, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let today = d(2024, 2, 1);
    let date = d(2024, 1, 15);

    // First the index shows one churned subscriber on the date.
    let before = Arc::new(MockSearchBackend::new(ten_subscribers_one_churn(
        1,
        d(2023, 12, 20),
        date,
    )));
    let proxy = proxy_with(before, Arc::clone(&store), seller.clone(), today);
    assert!(proxy.overwrite_cache(date, Granularity::Daily).await.unwrap());

    // A late correction: the deactivation moved to a different subscription
    // with a different price, and a second one churned the same day.
    let corrected = vec![
        sub(1, 1, 1, d(2023, 12, 20), None, 1000),
        sub(1, 2, 1, d(2023, 12, 20), Some(date), 250),
        sub(1, 3, 1, d(2023, 12, 20), Some(date), 250),
    ];
    let after = Arc::new(MockSearchBackend::new(corrected));
    let proxy = proxy_with(Arc::clone(&after), Arc::clone(&store), seller, today);
    assert!(proxy.overwrite_cache(date, Granularity::Daily).await.unwrap());

    // The cached entry is exactly the second computation, not a merge.
    let data = proxy
        .data_for_dates(date, date, Granularity::Daily, &Default::default())
        .await
        .unwrap();
    let stats = &data[&Granularity::Daily.period_key(date)];
    assert_eq!(stats.churned_users, 2);
    assert_eq!(stats.revenue_lost_cents, 500);
    // Served from cache: no backend traffic for a settled cached period.
    assert_eq!(after.churn_pages.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overwrite_skips_unsettled_periods() {
    let seller = cacheable_seller(1, d(2024, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockSearchBackend::new(vec![]));
    let today = d(2024, 1, 20);
    let proxy = proxy_with(backend, Arc::clone(&store), seller, today);

    // Live-window days are skipped.
    assert!(!proxy.overwrite_cache(today, Granularity::Daily).await.unwrap());
    assert!(!proxy
        .overwrite_cache(d(2024, 1, 19), Granularity::Daily)
        .await
        .unwrap());
    // The current month has not completed, so its monthly entry is skipped.
    assert!(!proxy
        .overwrite_cache(d(2024, 1, 5), Granularity::Monthly)
        .await
        .unwrap());
    // A settled day is rewritten.
    assert!(proxy
        .overwrite_cache(d(2024, 1, 10), Granularity::Daily)
        .await
        .unwrap());

    assert_eq!(store.stats().await.entries, 1);
}

#[tokio::test]
async fn corrupt_cache_entry_is_recomputed_and_repaired() {
    let seller = cacheable_seller(1, d(2024, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let date = d(2024, 1, 15);
    let key = cache_key(0, &seller, Granularity::Daily, date);
    store.upsert(key.clone(), "{corrupt".into()).await.unwrap();

    let backend = Arc::new(MockSearchBackend::new(ten_subscribers_one_churn(
        1,
        d(2023, 12, 20),
        date,
    )));
    let proxy = proxy_with(backend, Arc::clone(&store), seller, d(2024, 2, 1));

    let data = proxy
        .data_for_dates(date, date, Granularity::Daily, &Default::default())
        .await
        .unwrap();
    let stats = &data[&Granularity::Daily.period_key(date)];
    assert_eq!(stats.churned_users, 1);
    assert_eq!(stats.churn_rate, 10.0);

    // The bad blob was replaced by the recomputed entry.
    let found = store.batch_get(std::slice::from_ref(&key)).await.unwrap();
    let repaired = decode_entry(&key, &found[&key]).unwrap();
    assert_eq!(repaired[&Granularity::Daily.period_key(date)].churned_users, 1);
}

#[tokio::test]
async fn product_scoped_requests_bypass_the_cache() {
    let seller = cacheable_seller(1, d(2024, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let date = d(2024, 1, 15);
    // Cached sentinel that must NOT be served for a product-scoped read.
    store
        .upsert(
            cache_key(0, &seller, Granularity::Daily, date),
            sentinel_blob(Granularity::Daily, date, 42),
        )
        .await
        .unwrap();

    let backend = Arc::new(MockSearchBackend::new(vec![
        sub(1, 1, 10, d(2023, 12, 20), Some(date), 700),
        sub(1, 2, 20, d(2023, 12, 20), Some(date), 900),
    ]));
    let proxy = proxy_with(backend, Arc::clone(&store), seller, d(2024, 2, 1));

    let data = proxy
        .data_for_dates(date, date, Granularity::Daily, &vec![ProductId(10)].into())
        .await
        .unwrap();
    let stats = &data[&Granularity::Daily.period_key(date)];
    assert_eq!(stats.churned_users, 1);
    assert_eq!(stats.revenue_lost_cents, 700);

    // No additional writes happened.
    assert_eq!(store.stats().await.writes, 1);
}

#[tokio::test]
async fn non_eligible_sellers_bypass_the_cache() {
    let seller = Seller::new(SellerId(1), chrono_tz::UTC)
        .with_created_at(helpers::noon(d(2023, 1, 1)))
        .with_first_sale_at(helpers::noon(d(2024, 1, 1)))
        .with_subscription_sales(true); // not a large seller
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockSearchBackend::new(ten_subscribers_one_churn(
        1,
        d(2023, 12, 20),
        d(2024, 1, 15),
    )));
    let proxy = proxy_with(backend, Arc::clone(&store), seller, d(2024, 2, 1));
    assert_eq!(proxy.strategy(), CacheStrategy::Bypass);

    let data = proxy
        .data_for_dates(d(2024, 1, 10), d(2024, 1, 20), Granularity::Daily, &Default::default())
        .await
        .unwrap();
    assert_eq!(data[&Granularity::Daily.period_key(d(2024, 1, 15))].churned_users, 1);
    assert_eq!(store.stats().await.entries, 0);
}

#[tokio::test]
async fn generate_cache_backfills_all_settled_periods() {
    let seller = cacheable_seller(1, d(2024, 1, 10));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockSearchBackend::new(ten_subscribers_one_churn(
        1,
        d(2024, 1, 9),
        d(2024, 1, 15),
    )));
    let proxy = proxy_with(Arc::clone(&backend), Arc::clone(&store), seller, d(2024, 3, 10));

    // Settled daily periods: 2024-01-10 .. 2024-03-08 (59 days). Complete
    // settled months: January and February.
    let written = proxy.generate_cache().await.unwrap();
    assert_eq!(written, 61);
    assert_eq!(store.stats().await.entries, 61);

    // A cached read afterwards touches the backend only for the live window.
    let pages_before = backend.churn_pages.load(Ordering::SeqCst);
    let data = proxy
        .data_for_dates(d(2024, 1, 10), d(2024, 1, 31), Granularity::Daily, &Default::default())
        .await
        .unwrap();
    assert_eq!(data.len(), 22);
    assert_eq!(backend.churn_pages.load(Ordering::SeqCst), pages_before);

    // Running it again finds nothing to do.
    assert_eq!(proxy.generate_cache().await.unwrap(), 0);
}

#[tokio::test]
async fn bulk_population_isolates_per_seller_failures() {
    let mut subs = ten_subscribers_one_churn(1, d(2024, 1, 9), d(2024, 1, 15));
    subs.extend(ten_subscribers_one_churn(2, d(2024, 1, 9), d(2024, 1, 20)));
    let backend = Arc::new(MockSearchBackend::new(subs));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());

    let failing = cacheable_seller(1, d(2024, 1, 10));
    let healthy = cacheable_seller(2, d(2024, 1, 10));
    let no_subscriptions = cacheable_seller(3, d(2024, 1, 10)).with_subscription_sales(false);

    // The very first backfill query (for the first seller) fails.
    backend.fail_next_churn_queries(1);
    let report = generate_all_caches(
        Arc::clone(&backend),
        Arc::clone(&store),
        &[failing, healthy, no_subscriptions],
        &ChurnscanConfig::default(),
    )
    .await;

    assert_eq!(report.completed, vec![SellerId(2)]);
    assert_eq!(report.skipped, vec![SellerId(3)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, SellerId(1));
    assert!(report.entries_written > 0);
}

#[tokio::test]
async fn scheduled_regeneration_rewrites_both_granularities() {
    let seller = cacheable_seller(1, d(2024, 1, 1));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockSearchBackend::new(ten_subscribers_one_churn(
        1,
        d(2023, 12, 20),
        d(2024, 1, 15),
    )));

    let regenerator = Arc::new(CacheRegenerator::new(
        backend,
        Arc::clone(&store),
        [seller.clone()],
        ChurnscanConfig::default(),
    ));
    let scheduler = RegenerationScheduler::spawn(regenerator, test_config());

    assert!(scheduler.schedule(seller.id, d(2024, 1, 15)).await);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // One daily entry and one monthly entry for the date's month.
    let keys = [
        cache_key(0, &seller, Granularity::Daily, d(2024, 1, 15)),
        cache_key(0, &seller, Granularity::Monthly, d(2024, 1, 15)),
    ];
    let found = store.batch_get(&keys).await.unwrap();
    assert_eq!(found.len(), 2);
}
