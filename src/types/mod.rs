//! Core data model: dates and periods, per-period statistics, sellers

pub mod dates;
pub mod seller;
pub mod stats;

pub use dates::{
    beginning_of_month, end_of_month, periods_for, DateRange, Granularity, Period, PeriodKey,
};
pub use seller::{ProductId, ProductSet, Seller, SellerId};
pub use stats::{ChurnData, PeriodStats, SummaryStats};
