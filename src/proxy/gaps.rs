//! Gap detection over per-period cache lookup results
//!
//! After a batch cache read, each period in the requested range is either a
//! hit or a miss. Consecutive misses are grouped into contiguous sub-ranges
//! so each gap costs one engine invocation instead of one per period.
//! Contiguity is calendar adjacency at the reporting granularity: Jan 31 and
//! Feb 1 are adjacent daily, 2024-01 and 2024-02 adjacent monthly.

use chrono::NaiveDate;

use crate::types::Granularity;

/// A contiguous run of uncached periods, as inclusive date bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Groups missed periods into contiguous gaps
///
/// `lookups` pairs each period's representative date with whether the cache
/// held it, ordered as the range enumerates its periods (daily: each date;
/// monthly: the first in-range date of each month). Misses separated by a
/// hit, or by any calendar distance beyond adjacency, land in separate gaps.
pub fn missing_ranges(lookups: &[(NaiveDate, bool)], granularity: Granularity) -> Vec<Gap> {
    let mut gaps: Vec<Gap> = Vec::new();
    let mut last_miss: Option<NaiveDate> = None;

    for &(date, hit) in lookups {
        if hit {
            last_miss = None;
            continue;
        }

        match (gaps.last_mut(), last_miss) {
            (Some(gap), Some(prev)) if granularity.adjacent(prev, date) => {
                gap.end = date;
            }
            _ => gaps.push(Gap {
                start: date,
                end: date,
            }),
        }
        last_miss = Some(date);
    }

    gaps
}
