//! Seller identity and analytics-relevant account state
//!
//! All date boundaries in churn analytics are relative to the seller's
//! timezone: "today", the live (never-cached) window, and the earliest date
//! for which metrics are meaningful.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seller (merchant) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerId(pub u64);

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product identifier as indexed by the search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of products a single engine invocation is scoped to
///
/// An empty set places no product constraint on queries; explicit product
/// scoping is what disables caching in the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductSet(Vec<ProductId>);

impl ProductSet {
    /// No product constraint
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[ProductId] {
        &self.0
    }
}

impl From<Vec<ProductId>> for ProductSet {
    fn from(ids: Vec<ProductId>) -> Self {
        Self(ids)
    }
}

impl FromIterator<ProductId> for ProductSet {
    fn from_iter<I: IntoIterator<Item = ProductId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A merchant account as seen by churn analytics
///
/// Carries only what the engine, proxy, and jobs need: identity, timezone,
/// the timestamps that bound meaningful history, and the eligibility flags
/// for caching.
///
/// # Examples
///
/// ```
/// use churnscan::{Seller, SellerId};
/// use chrono::{TimeZone, Utc};
///
/// let seller = Seller::new(SellerId(42), chrono_tz::America::New_York)
///     .with_created_at(Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap())
///     .with_first_sale_at(Utc.with_ymd_and_hms(2024, 1, 10, 8, 30, 0).unwrap())
///     .with_large_seller(true)
///     .with_subscription_sales(true);
///
/// assert!(seller.first_sale_date().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct Seller {
    pub id: SellerId,
    pub timezone: Tz,
    /// Account creation instant; fallback origin when no sale exists
    pub created_at: DateTime<Utc>,
    /// First charged sale, if any; the origin of meaningful analytics
    pub first_sale_at: Option<DateTime<Utc>>,
    /// High-volume account flagged for cache eligibility
    pub large_seller: bool,
    /// Whether the seller has at least one subscription sale
    pub has_subscription_sales: bool,
    /// Suspended accounts are skipped by bulk cache population
    pub suspended: bool,
}

impl Seller {
    pub fn new(id: SellerId, timezone: Tz) -> Self {
        Self {
            id,
            timezone,
            created_at: Utc::now(),
            first_sale_at: None,
            large_seller: false,
            has_subscription_sales: false,
            suspended: false,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_first_sale_at(mut self, first_sale_at: DateTime<Utc>) -> Self {
        self.first_sale_at = Some(first_sale_at);
        self
    }

    pub fn with_large_seller(mut self, large_seller: bool) -> Self {
        self.large_seller = large_seller;
        self
    }

    pub fn with_subscription_sales(mut self, has_subscription_sales: bool) -> Self {
        self.has_subscription_sales = has_subscription_sales;
        self
    }

    pub fn with_suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }

    /// Today's date in the seller's timezone
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// First-sale date in the seller's timezone, if a sale exists
    pub fn first_sale_date(&self) -> Option<NaiveDate> {
        self.first_sale_at
            .map(|at| at.with_timezone(&self.timezone).date_naive())
    }

    /// Earliest date for which churn metrics mean anything: the first sale,
    /// or account creation when no sale exists
    pub fn earliest_meaningful_date(&self) -> NaiveDate {
        self.first_sale_date()
            .unwrap_or_else(|| self.created_at.with_timezone(&self.timezone).date_naive())
    }

    /// Current UTC offset of the seller's timezone, formatted `±HH:MM` for
    /// search query bodies
    pub fn timezone_offset(&self) -> String {
        Utc::now()
            .with_timezone(&self.timezone)
            .format("%:z")
            .to_string()
    }
}
