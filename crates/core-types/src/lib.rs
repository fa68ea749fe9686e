// In crates/core-types/src/lib.rs

pub mod error;
pub mod pair;
pub mod signal;
pub mod trade;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use error::{Error, Result};
pub use pair::{PairStatistics, TradingPair};
pub use signal::{Signal, SignalRejection};
pub use trade::{ExitFill, ExitKind, Sizing, Trade};
pub use types::{
    AssetClass, CancelReason, ConfluenceFactor, ExitReason, MarketStructure, OrderId,
    PeriodType, SetupType, Side, SignalId, Symbol, TimeFrame, TradeId, TradeStatus, UserId,
    VolatilityTier,
};
