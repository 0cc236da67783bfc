//! Versioned cache-key scheme
//!
//! One key per (seller, granularity, period). The global cache-format
//! version is embedded in every key, so bumping it invalidates all entries
//! at once without deleting anything: old keys simply stop being looked up.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Granularity, Seller};

/// Opaque cache-store key
///
/// Keys are short strings (well under the store's few-hundred-byte limit)
/// and are only ever produced by [`cache_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic key for one (seller, granularity, period)
///
/// Daily periods are keyed `YYYY-MM-DD`; monthly periods are keyed
/// `YYYY-MM`, derived from any date inside the month. The seller's timezone
/// is part of the key because period boundaries shift with it: a timezone
/// change must not resurface entries computed under the old boundaries.
pub fn cache_key(
    version: u64,
    seller: &Seller,
    granularity: Granularity,
    date: NaiveDate,
) -> CacheKey {
    let period = match granularity {
        Granularity::Daily => date.format("%Y-%m-%d").to_string(),
        Granularity::Monthly => date.format("%Y-%m").to_string(),
    };
    CacheKey(format!(
        "seller_churn_analytics_v{version}_user_{id}_{tz}_churn_{granularity}_for_{period}",
        id = seller.id,
        tz = seller.timezone,
    ))
}
