//! Date ranges, reporting granularity, and period arithmetic
//!
//! Churn metrics are computed over inclusive calendar-date ranges in the
//! seller's timezone, bucketed either per day or per calendar month. This
//! module provides the range type with the clamping policy every entry point
//! applies, the period-key scheme (`YYYY-MM-DD` daily, `YYYY-MM` monthly),
//! and the calendar helpers the gap-detection and backfill code rely on.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reporting granularity for churn periods
///
/// Daily periods are single calendar dates; monthly periods are calendar
/// months identified by their `YYYY-MM` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    /// Canonical lowercase name, used in cache keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
        }
    }

    /// Calendar interval name for the search backend's date histogram
    pub fn calendar_interval(&self) -> &'static str {
        match self {
            Granularity::Daily => "day",
            Granularity::Monthly => "month",
        }
    }

    /// Bucket key format the search backend should apply to histogram keys
    pub fn date_format(&self) -> &'static str {
        match self {
            Granularity::Daily => "yyyy-MM-dd",
            Granularity::Monthly => "yyyy-MM",
        }
    }

    /// Period key for the period containing `date`
    pub fn period_key(&self, date: NaiveDate) -> PeriodKey {
        match self {
            Granularity::Daily => PeriodKey::daily(date),
            Granularity::Monthly => PeriodKey::monthly(date),
        }
    }

    /// Whether the period containing `next` immediately follows the period
    /// containing `prev` on the calendar
    ///
    /// Gap contiguity is decided by this adjacency, not by key equality.
    pub fn adjacent(&self, prev: NaiveDate, next: NaiveDate) -> bool {
        match self {
            Granularity::Daily => prev.succ_opt() == Some(next),
            Granularity::Monthly => {
                beginning_of_month(prev).checked_add_months(Months::new(1))
                    == Some(beginning_of_month(next))
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier for one churn period
///
/// `YYYY-MM-DD` for daily periods and `YYYY-MM` for monthly ones. Both
/// formats sort chronologically under the derived lexicographic order, so a
/// `BTreeMap<PeriodKey, _>` iterates periods in calendar order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    /// Key for the daily period of `date`
    pub fn daily(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    /// Key for the calendar month containing `date`
    pub fn monthly(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m").to_string())
    }

    /// Wraps a key received from the search backend verbatim
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive calendar-date range in the seller's timezone
///
/// The `start <= end` invariant is enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range, returning `None` when `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Single-day range
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Clamps a requested range to `[earliest, today]`
    ///
    /// The start is clamped first; the end is then clamped to
    /// `[clamped_start, today]`, so a reversed request collapses onto its
    /// clamped start rather than failing. Returns `None` only when
    /// `earliest > today`, in which case no meaningful range exists and
    /// callers treat the input as empty.
    pub fn clamped(
        start: NaiveDate,
        end: NaiveDate,
        earliest: NaiveDate,
        today: NaiveDate,
    ) -> Option<Self> {
        if earliest > today {
            return None;
        }
        let start = start.clamp(earliest, today);
        let end = end.clamp(start, today);
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, inclusive
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Iterates every date in the range in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |d| {
            d.succ_opt().filter(|next| *next <= end)
        })
    }

    /// First day of every calendar month touched by the range, in order
    pub fn months(&self) -> Vec<NaiveDate> {
        let mut months = Vec::new();
        let mut current = beginning_of_month(self.start);
        let last = beginning_of_month(self.end);
        while current <= last {
            months.push(current);
            match current.checked_add_months(Months::new(1)) {
                Some(next) => current = next,
                None => break,
            }
        }
        months
    }

    /// The immediately preceding range of equal day count
    ///
    /// Ends the day before this range starts. Day-count-equivalent rather
    /// than calendar-equivalent, so month-over-month comparisons always pit
    /// windows of the same length against each other.
    pub fn preceding_of_equal_length(&self) -> Option<Self> {
        let prev_end = self.start.pred_opt()?;
        let prev_start = prev_end.checked_sub_days(Days::new(self.len_days() as u64 - 1))?;
        Self::new(prev_start, prev_end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One reporting period within a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    /// Map key for this period
    pub key: PeriodKey,
    /// Period start instant as a date: the date itself for daily, the
    /// calendar-month start for monthly (even when the range begins
    /// mid-month). Active-subscriber cutoffs use this date.
    pub start: NaiveDate,
    /// Last date of the period that falls inside the range
    pub last: NaiveDate,
}

/// Enumerates the periods of `range` at the given granularity, in order
///
/// Every period touched by the range appears, including periods that will
/// turn out to have zero churn events.
pub fn periods_for(granularity: Granularity, range: &DateRange) -> Vec<Period> {
    match granularity {
        Granularity::Daily => range
            .days()
            .map(|date| Period {
                key: PeriodKey::daily(date),
                start: date,
                last: date,
            })
            .collect(),
        Granularity::Monthly => {
            let mut periods: Vec<Period> = Vec::new();
            for date in range.days() {
                match periods.last_mut() {
                    Some(period) if period.start == beginning_of_month(date) => {
                        period.last = date;
                    }
                    _ => periods.push(Period {
                        key: PeriodKey::monthly(date),
                        start: beginning_of_month(date),
                        last: date,
                    }),
                }
            }
            periods
        }
    }
}

/// First day of the calendar month containing `date`
pub fn beginning_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the calendar month containing `date`
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    beginning_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}
