//! Consumer-facing churn report payload
//!
//! Assembles what a dashboard renders: ordered human-readable period labels,
//! parallel metric arrays aligned with them, a `total` block over the range,
//! a `last_period` comparison block, and the seller's formatted first-sale
//! date. The payload shape is identical in every case, including the all-zero
//! report returned when no products are selected: consumers never branch on
//! missing fields or error variants for an empty selection.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::errors::ChurnscanError;
use crate::proxy::ChurnCachingProxy;
use crate::search::SearchBackend;
use crate::types::{ChurnData, DateRange, Granularity, PeriodKey, ProductSet, SummaryStats};

/// Requested time range as received from the consumer, unparsed
///
/// Parsing is forgiving: if either bound is missing or malformed, the whole
/// range falls back to the trailing 30 days. Clamping to the seller's
/// history happens later, in the report assembly.
#[derive(Debug, Clone, Default)]
pub struct TimeRangeParams {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl TimeRangeParams {
    pub fn new(start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            start_time: Some(start_time.into()),
            end_time: Some(end_time.into()),
        }
    }

    /// Resolves to concrete dates, falling back to the last 30 days
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let parsed = self
            .start_time
            .as_deref()
            .zip(self.end_time.as_deref())
            .and_then(|(start, end)| {
                let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
                let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
                Some((start, end))
            });

        parsed.unwrap_or_else(|| (today - chrono::Days::new(29), today))
    }
}

/// Which products the report covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductSelection {
    /// Nothing selected: the report is all zeros
    None,
    /// All products: the cache-eligible path
    All,
    /// An explicit subset: always computed live
    Products(ProductSet),
}

/// Parallel per-period metric arrays, aligned with the report's labels
#[derive(Debug, Clone, Serialize)]
pub struct SeriesBlock {
    pub churn_rate: Vec<f64>,
    pub churned_users: Vec<u64>,
    pub revenue_lost_cents: Vec<u64>,
}

/// Aggregate metrics over the whole requested range
#[derive(Debug, Clone, Serialize)]
pub struct TotalBlock {
    pub churn_rate: f64,
    pub churned_users: u64,
    pub revenue_lost_cents: u64,
    pub avg_active_base: u64,
}

impl From<SummaryStats> for TotalBlock {
    fn from(stats: SummaryStats) -> Self {
        Self {
            churn_rate: stats.churn_rate,
            churned_users: stats.churned_users,
            revenue_lost_cents: stats.revenue_lost_cents,
            avg_active_base: stats.avg_active_base,
        }
    }
}

/// Aggregate metrics over the preceding range of equal length
#[derive(Debug, Clone, Serialize)]
pub struct LastPeriodBlock {
    pub churn_rate: f64,
    pub churned_users: u64,
    pub revenue_lost_cents: u64,
}

impl From<SummaryStats> for LastPeriodBlock {
    fn from(stats: SummaryStats) -> Self {
        Self {
            churn_rate: stats.churn_rate,
            churned_users: stats.churned_users,
            revenue_lost_cents: stats.revenue_lost_cents,
        }
    }
}

/// Complete consumer payload for one report request
#[derive(Debug, Clone, Serialize)]
pub struct ChurnReport {
    /// Ordered period labels (daily `"Monday, January 15th"`, monthly
    /// `"January 2024"`)
    pub dates: Vec<String>,
    /// First label, if the range is non-empty
    pub start_date: Option<String>,
    /// Last label, if the range is non-empty
    pub end_date: Option<String>,
    pub by_date: SeriesBlock,
    pub total: TotalBlock,
    pub last_period: LastPeriodBlock,
    /// Seller's first sale, formatted `"January 10, 2024"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_sale_date: Option<String>,
}

/// Builds the full report for one request
///
/// The requested range is clamped to the seller's meaningful history; data
/// flows through the proxy (cached or live per its policy), totals come from
/// the merged per-period map, and the comparison block is best-effort.
pub async fn churn_report<S: SearchBackend>(
    proxy: &ChurnCachingProxy<S>,
    params: &TimeRangeParams,
    granularity: Granularity,
    selection: &ProductSelection,
) -> Result<ChurnReport, ChurnscanError> {
    let seller = proxy.seller();
    let today = proxy.today();
    let (start, end) = params.resolve(today);

    let range = DateRange::clamped(start, end, seller.earliest_meaningful_date(), today);
    let (keys, labels) = match &range {
        Some(range) => period_labels(granularity, range),
        None => (Vec::new(), Vec::new()),
    };

    let first_sale_date = seller
        .first_sale_date()
        .map(|date| date.format("%B %d, %Y").to_string());

    let products = match selection {
        ProductSelection::None => {
            return Ok(zero_report(labels, first_sale_date));
        }
        ProductSelection::All => ProductSet::all(),
        ProductSelection::Products(set) => set.clone(),
    };

    let data = match &range {
        Some(range) => {
            proxy
                .data_for_dates(range.start(), range.end(), granularity, &products)
                .await?
        }
        None => ChurnData::new(),
    };

    let mut series = SeriesBlock {
        churn_rate: Vec::with_capacity(keys.len()),
        churned_users: Vec::with_capacity(keys.len()),
        revenue_lost_cents: Vec::with_capacity(keys.len()),
    };
    for key in &keys {
        let stats = data.get(key).cloned().unwrap_or_default();
        series.churn_rate.push(stats.churn_rate);
        series.churned_users.push(stats.churned_users);
        series.revenue_lost_cents.push(stats.revenue_lost_cents);
    }

    let total = SummaryStats::from_periods(&data);
    let last_period = match &range {
        Some(range) => {
            proxy
                .engine(products, granularity)
                .last_period_stats(range.start(), range.end())
                .await
        }
        None => SummaryStats::zero(),
    };

    Ok(ChurnReport {
        start_date: labels.first().cloned(),
        end_date: labels.last().cloned(),
        dates: labels,
        by_date: series,
        total: total.into(),
        last_period: last_period.into(),
        first_sale_date,
    })
}

/// Keys and display labels for every period of the range, in order
fn period_labels(granularity: Granularity, range: &DateRange) -> (Vec<PeriodKey>, Vec<String>) {
    match granularity {
        Granularity::Daily => range
            .days()
            .map(|date| (PeriodKey::daily(date), daily_label(date)))
            .unzip(),
        Granularity::Monthly => range
            .months()
            .iter()
            .map(|month| (PeriodKey::monthly(*month), month.format("%B %Y").to_string()))
            .unzip(),
    }
}

fn daily_label(date: NaiveDate) -> String {
    format!(
        "{}{}",
        date.format("%A, %B %-d"),
        ordinal_suffix(date.day())
    )
}

/// English ordinal suffix for a day of month
fn ordinal_suffix(day: u32) -> &'static str {
    match day {
        11..=13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    }
}

/// Identically-shaped payload with every metric zeroed
fn zero_report(labels: Vec<String>, first_sale_date: Option<String>) -> ChurnReport {
    let len = labels.len();
    ChurnReport {
        start_date: labels.first().cloned(),
        end_date: labels.last().cloned(),
        dates: labels,
        by_date: SeriesBlock {
            churn_rate: vec![0.0; len],
            churned_users: vec![0; len],
            revenue_lost_cents: vec![0; len],
        },
        total: SummaryStats::zero().into(),
        last_period: SummaryStats::zero().into(),
        first_sale_date,
    }
}
