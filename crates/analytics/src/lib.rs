// In crates/analytics/src/lib.rs

//! Rolling trade statistics.
//!
//! [`StatisticsAggregator`] updates buckets one closed trade at a time;
//! [`AnalyticsEngine`] rebuilds a bucket from its history. Both agree.

pub mod aggregator;
pub mod engine;
pub mod types;

// Re-export public types
pub use aggregator::StatisticsAggregator;
pub use engine::AnalyticsEngine;
pub use types::{
    AppliedTrades, Breakdown, ProfitFactor, RunningTotals, Statistics, StatisticsKey, TradeOutcome,
    period_start,
};
