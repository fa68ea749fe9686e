// In crates/confluence/src/lib.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Symbol, TimeFrame};

pub mod error;
pub mod evaluator;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use evaluator::{ConfluenceEvaluator, EvaluationContext};
pub use types::{ConfluenceTables, IndicatorSnapshot, SetupRule, SetupTable, StopBand, StopBandTable};

/// The boundary to the detection layer (order blocks, liquidity zones,
/// volume profile, CVD).
///
/// Returning `None` means there is nothing to trade right now. Missing data
/// is a normal outcome, not an error.
#[async_trait]
pub trait IndicatorProvider: Send + Sync {
    /// The name of the provider, used in logs.
    fn name(&self) -> &'static str;

    async fn snapshot(
        &self,
        symbol: &Symbol,
        timeframe: TimeFrame,
        at: DateTime<Utc>,
    ) -> Option<IndicatorSnapshot>;
}
