//! Background jobs: bulk cache population and targeted regeneration
//!
//! Two maintenance flows keep the churn cache correct:
//!
//! - [`generate_all_caches`] walks a set of sellers and backfills every
//!   missing entry, isolating per-seller failures so one bad seller never
//!   aborts the batch
//! - [`RegenerationScheduler`] accepts fire-and-forget triggers from
//!   subscription-state changes, deduplicates them per (seller, date) until
//!   executed, delays execution briefly so bursts of writes collapse into
//!   one run, and rewrites both granularities under a generous timeout with
//!   one automatic retry for transient failures

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

use crate::cache::CacheStore;
use crate::config::ChurnscanConfig;
use crate::errors::{ChurnscanError, SearchError};
use crate::proxy::ChurnCachingProxy;
use crate::search::SearchBackend;
use crate::spans;
use crate::types::{Granularity, Seller, SellerId};

/// Outcome of one bulk cache-population run
#[derive(Debug, Default)]
pub struct BackfillReport {
    /// Sellers whose caches were fully populated
    pub completed: Vec<SellerId>,
    /// Sellers skipped as not cache-eligible or suspended
    pub skipped: Vec<SellerId>,
    /// Sellers whose population failed, with the error rendered
    pub failed: Vec<(SellerId, String)>,
    /// Total cache entries written across all sellers
    pub entries_written: u64,
}

/// Populates the churn cache for every eligible seller in the batch
///
/// Sellers without subscription sales, below the large-seller threshold, or
/// suspended are skipped. A failure for one seller is recorded and logged
/// with the seller id; the batch always runs to completion.
pub async fn generate_all_caches<S: SearchBackend>(
    backend: Arc<S>,
    store: Arc<dyn CacheStore>,
    sellers: &[Seller],
    config: &ChurnscanConfig,
) -> BackfillReport {
    let mut report = BackfillReport::default();

    for seller in sellers {
        if seller.suspended || !seller.large_seller || !seller.has_subscription_sales {
            debug!(seller_id = %seller.id, "Skipping seller for cache population");
            report.skipped.push(seller.id);
            continue;
        }

        let proxy = ChurnCachingProxy::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            seller.clone(),
            config.clone(),
        );
        match proxy.generate_cache().await {
            Ok(written) => {
                report.entries_written += written;
                report.completed.push(seller.id);
            }
            Err(e) => {
                error!(seller_id = %seller.id, error = %e, "Cache population failed for seller");
                report.failed.push((seller.id, e.to_string()));
            }
        }
    }

    info!(
        completed = report.completed.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        entries_written = report.entries_written,
        "Finished bulk churn-cache population"
    );
    report
}

/// A subscription purchase mutation relevant to cached churn statistics
#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    /// Original purchase instant of the subscription
    pub created_at: DateTime<Utc>,
    /// Current deactivation instant, if deactivated
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Whether this mutation changed the deactivation instant
    pub deactivation_changed: bool,
}

/// The cache date a subscription-state change invalidates
///
/// A changed deactivation invalidates the deactivation date (the period the
/// churn event moved into or out of); any other relevant change invalidates
/// the purchase date. Returns `None` when that date is today in the
/// seller's timezone, since live-window periods are never cached.
pub fn regeneration_date_for_change(
    change: &SubscriptionChange,
    timezone: &Tz,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let date = match (change.deactivation_changed, change.deactivated_at) {
        (true, Some(at)) => at.with_timezone(timezone).date_naive(),
        _ => change.created_at.with_timezone(timezone).date_naive(),
    };
    (date != today).then_some(date)
}

/// Executes one regeneration: rewrite the cache entries holding a date
#[async_trait]
pub trait RegenerationRunner: Send + Sync {
    async fn regenerate(&self, seller: SellerId, date: NaiveDate) -> Result<(), ChurnscanError>;
}

/// Production [`RegenerationRunner`] over the caching proxy
///
/// Holds the sellers it may regenerate for; a trigger for an unknown seller
/// is logged and dropped rather than failing, since the seller may have
/// been removed between trigger and execution.
pub struct CacheRegenerator<S> {
    backend: Arc<S>,
    store: Arc<dyn CacheStore>,
    sellers: HashMap<SellerId, Seller>,
    config: ChurnscanConfig,
}

impl<S: SearchBackend> CacheRegenerator<S> {
    pub fn new(
        backend: Arc<S>,
        store: Arc<dyn CacheStore>,
        sellers: impl IntoIterator<Item = Seller>,
        config: ChurnscanConfig,
    ) -> Self {
        Self {
            backend,
            store,
            sellers: sellers.into_iter().map(|s| (s.id, s)).collect(),
            config,
        }
    }
}

#[async_trait]
impl<S: SearchBackend> RegenerationRunner for CacheRegenerator<S> {
    async fn regenerate(&self, seller: SellerId, date: NaiveDate) -> Result<(), ChurnscanError> {
        let span = spans::regenerate(seller, date);
        async {
            let Some(seller) = self.sellers.get(&seller) else {
                warn!(seller_id = %seller, "Unknown seller in regeneration trigger, dropping");
                return Ok(());
            };

            let proxy = ChurnCachingProxy::new(
                Arc::clone(&self.backend),
                Arc::clone(&self.store),
                seller.clone(),
                self.config.clone(),
            );
            for granularity in [Granularity::Daily, Granularity::Monthly] {
                proxy.overwrite_cache(date, granularity).await?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

enum Command {
    Schedule { seller: SellerId, date: NaiveDate },
    Finished { seller: SellerId, date: NaiveDate },
}

/// Deduplicating, debounced scheduler for cache regeneration
///
/// `schedule` is fire-and-forget: triggers for a (seller, date) already
/// pending are dropped, and execution is delayed by the configured buffer
/// so a burst of subscription writes produces a single regeneration. Each
/// run is bounded by the regeneration timeout and retried once when the
/// failure is transient.
///
/// The worker task runs for the lifetime of the process.
#[derive(Clone)]
pub struct RegenerationScheduler {
    tx: mpsc::Sender<Command>,
}

impl RegenerationScheduler {
    /// Spawns the scheduler's worker loop
    pub fn spawn(runner: Arc<dyn RegenerationRunner>, config: ChurnscanConfig) -> Self {
        let (tx, mut rx) = mpsc::channel(64);
        let loop_tx = tx.clone();

        tokio::spawn(async move {
            let mut pending: HashSet<(SellerId, NaiveDate)> = HashSet::new();
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Schedule { seller, date } => {
                        if !pending.insert((seller, date)) {
                            debug!(seller_id = %seller, date = %date, "Regeneration already pending");
                            continue;
                        }

                        let runner = Arc::clone(&runner);
                        let done = loop_tx.clone();
                        let delay = config.regeneration_delay;
                        let timeout = config.regeneration_timeout;
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            if let Err(e) =
                                run_with_retry(runner.as_ref(), seller, date, timeout).await
                            {
                                error!(
                                    seller_id = %seller,
                                    date = %date,
                                    error = %e,
                                    "Cache regeneration failed"
                                );
                            }
                            let _ = done.send(Command::Finished { seller, date }).await;
                        });
                    }
                    Command::Finished { seller, date } => {
                        pending.remove(&(seller, date));
                    }
                }
            }
        });

        Self { tx }
    }

    /// Requests regeneration of the cache entries holding `date`
    ///
    /// Returns `false` if the scheduler's worker is gone.
    pub async fn schedule(&self, seller: SellerId, date: NaiveDate) -> bool {
        self.tx
            .send(Command::Schedule { seller, date })
            .await
            .is_ok()
    }
}

/// Runs one regeneration under the timeout ceiling, retrying once on a
/// transient failure
async fn run_with_retry(
    runner: &dyn RegenerationRunner,
    seller: SellerId,
    date: NaiveDate,
    timeout: std::time::Duration,
) -> Result<(), ChurnscanError> {
    let bounded = || async move {
        tokio::time::timeout(timeout, runner.regenerate(seller, date))
            .await
            .map_err(|_| ChurnscanError::from(SearchError::timeout(timeout)))?
    };

    match bounded().await {
        Err(e) if e.is_retryable() => {
            warn!(
                seller_id = %seller,
                date = %date,
                error = %e,
                "Regeneration failed, retrying once"
            );
            bounded().await
        }
        other => other,
    }
}
