//! Subscription-churn analytics: aggregation engine and caching proxy
//!
//! `churnscan` computes per-period churn statistics (churned subscribers,
//! revenue lost, churn rate, active base) for a merchant from a
//! transactional-event search index, and serves them through a write-once
//! cache of fully settled periods.
//!
//! - [`ChurnEngine`] computes statistics live from a [`SearchBackend`]
//! - [`ChurnCachingProxy`] fronts the engine with a [`cache::CacheStore`],
//!   filling only the gaps and never caching the trailing live window
//! - [`report::churn_report`] assembles the consumer payload
//! - [`jobs`] provides bulk backfill and deduplicated regeneration triggers

pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod jobs;
pub mod proxy;
pub mod report;
pub mod search;
mod spans;
pub mod types;

pub use cache::{CacheStore, DiskStore, MemoryStore, NoOpStore};
pub use config::ChurnscanConfig;
pub use engine::ChurnEngine;
pub use errors::{CacheError, ChurnscanError, EngineError, SearchError};
pub use jobs::{generate_all_caches, CacheRegenerator, RegenerationScheduler};
pub use proxy::{CacheStrategy, ChurnCachingProxy};
pub use report::{churn_report, ChurnReport, ProductSelection, TimeRangeParams};
pub use search::SearchBackend;
pub use types::{
    ChurnData, DateRange, Granularity, PeriodKey, PeriodStats, ProductId, ProductSet, Seller,
    SellerId, SummaryStats,
};
