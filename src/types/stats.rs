//! Per-period and aggregated churn statistics
//!
//! [`PeriodStats`] is what the engine produces for every period and what the
//! cache stores. [`SummaryStats`] aggregates a set of periods using the
//! weighted-average churn-rate rule; the weighting keeps the aggregate rate
//! inside `[0, 100]` even when the subscriber base grows across the range.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::dates::PeriodKey;

/// Churn statistics for a single reporting period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    /// Subscriptions deactivated during the period
    pub churned_users: u64,
    /// Sum of churned subscriptions' prices, in minor currency units
    pub revenue_lost_cents: u64,
    /// `churned_users / active_subscribers * 100`, rounded to 2 decimals,
    /// clamped to `[0, 100]`; `0.0` when the active base is empty
    pub churn_rate: f64,
    /// Distinct subscriptions alive as of the period's start instant
    pub active_subscribers: u64,
}

impl PeriodStats {
    /// All-zero stats
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Churn statistics aggregated across a set of periods
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub churned_users: u64,
    pub revenue_lost_cents: u64,
    /// Weighted-average churn rate across periods with a nonzero active base
    pub churn_rate: f64,
    /// Mean active base across all periods, truncated to an integer
    pub avg_active_base: u64,
}

/// Per-period churn data keyed chronologically
pub type ChurnData = BTreeMap<PeriodKey, PeriodStats>;

impl SummaryStats {
    /// All-zero stats, used when a comparison range precedes the seller's
    /// history or a best-effort computation fails
    pub fn zero() -> Self {
        Self::default()
    }

    /// Aggregates per-period stats into summary totals
    ///
    /// Counts and revenue are plain sums. The churn rate is the average of
    /// per-period rates weighted by each period's active base, restricted to
    /// periods with `active_subscribers > 0`, rounded to 2 decimals, and
    /// clamped to `[0, 100]`. With no active base anywhere the rate is `0.0`.
    pub fn from_periods(data: &ChurnData) -> Self {
        let churned_users = data.values().map(|p| p.churned_users).sum();
        let revenue_lost_cents = data.values().map(|p| p.revenue_lost_cents).sum();

        let with_base: Vec<&PeriodStats> =
            data.values().filter(|p| p.active_subscribers > 0).collect();

        let churn_rate = if with_base.is_empty() {
            0.0
        } else {
            let weighted: f64 = with_base
                .iter()
                .map(|p| p.churn_rate * p.active_subscribers as f64)
                .sum();
            let base: f64 = with_base.iter().map(|p| p.active_subscribers as f64).sum();
            round2(weighted / base).clamp(0.0, 100.0)
        };

        let avg_active_base = if data.is_empty() {
            0
        } else {
            let total: u64 = data.values().map(|p| p.active_subscribers).sum();
            (total as f64 / data.len() as f64) as u64
        };

        Self {
            churned_users,
            revenue_lost_cents,
            churn_rate,
            avg_active_base,
        }
    }
}

/// Rounds to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(churned: u64, rate: f64, active: u64) -> PeriodStats {
        PeriodStats {
            churned_users: churned,
            revenue_lost_cents: churned * 1000,
            churn_rate: rate,
            active_subscribers: active,
        }
    }

    fn key(i: u32) -> PeriodKey {
        PeriodKey::from_raw(format!("2024-01-{i:02}"))
    }

    #[test]
    fn empty_periods_yield_zero_summary() {
        assert_eq!(SummaryStats::from_periods(&ChurnData::new()), SummaryStats::zero());
    }

    #[test]
    fn sums_and_weighted_rate() {
        let mut data = ChurnData::new();
        // 10% of 100 and 2% of 400: weighted rate is (10*100 + 2*400) / 500.
        data.insert(key(1), stats(10, 10.0, 100));
        data.insert(key(2), stats(8, 2.0, 400));

        let total = SummaryStats::from_periods(&data);
        assert_eq!(total.churned_users, 18);
        assert_eq!(total.revenue_lost_cents, 18_000);
        assert_eq!(total.churn_rate, 3.6);
        assert_eq!(total.avg_active_base, 250);
    }

    #[test]
    fn zero_base_periods_excluded_from_rate_but_not_counts() {
        let mut data = ChurnData::new();
        data.insert(key(1), stats(5, 50.0, 10));
        data.insert(key(2), stats(3, 0.0, 0));

        let total = SummaryStats::from_periods(&data);
        assert_eq!(total.churned_users, 8);
        assert_eq!(total.churn_rate, 50.0);
        // avg_active_base averages over all periods, including the empty one.
        assert_eq!(total.avg_active_base, 5);
    }

    #[test]
    fn all_zero_base_gives_zero_rate() {
        let mut data = ChurnData::new();
        data.insert(key(1), stats(4, 0.0, 0));
        assert_eq!(SummaryStats::from_periods(&data).churn_rate, 0.0);
    }

    #[test]
    fn avg_active_base_truncates() {
        let mut data = ChurnData::new();
        data.insert(key(1), stats(0, 0.0, 10));
        data.insert(key(2), stats(0, 0.0, 10));
        data.insert(key(3), stats(0, 0.0, 11));
        // 31 / 3 = 10.33..; truncated, not rounded.
        assert_eq!(SummaryStats::from_periods(&data).avg_active_base, 10);
    }

    proptest! {
        // With a uniform active base the weighted average degenerates to the
        // simple mean of the per-period rates.
        #[test]
        fn uniform_base_equals_simple_mean(
            rates in proptest::collection::vec(0.0f64..100.0, 1..20),
            base in 1u64..10_000,
        ) {
            let mut data = ChurnData::new();
            for (i, rate) in rates.iter().enumerate() {
                data.insert(
                    PeriodKey::from_raw(format!("p{i:03}")),
                    stats(0, round2(*rate), base),
                );
            }
            let total = SummaryStats::from_periods(&data);
            let mean: f64 = data.values().map(|p| p.churn_rate).sum::<f64>()
                / rates.len() as f64;
            prop_assert!((total.churn_rate - round2(mean)).abs() < 0.011);
        }

        // The summary rate never leaves [0, 100] for any input rates.
        #[test]
        fn summary_rate_bounded(
            periods in proptest::collection::vec((0.0f64..100.0, 0u64..1000), 0..20),
        ) {
            let mut data = ChurnData::new();
            for (i, (rate, base)) in periods.iter().enumerate() {
                data.insert(
                    PeriodKey::from_raw(format!("p{i:03}")),
                    stats(0, round2(*rate), *base),
                );
            }
            let total = SummaryStats::from_periods(&data);
            prop_assert!((0.0..=100.0).contains(&total.churn_rate));
        }
    }
}
