// In crates/core-types/src/pair.rs

use crate::types::{AssetClass, Symbol, VolatilityTier};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Static and statistical information about a tradable pair.
///
/// The record is maintained by the market-data ingester. The engine only writes
/// the `stats` block when a trade on this pair closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    pub symbol: Symbol,
    pub base_currency: String,
    pub quote_currency: String,
    pub asset_class: AssetClass,
    pub volatility_tier: VolatilityTier,
    /// 1 = high liquidity, 2 = medium, higher is thinner.
    #[serde(default = "default_liquidity_tier")]
    pub liquidity_tier: u8,
    /// Smallest allowed position notional in the quote currency.
    pub min_trade_size: Decimal,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Maker fee in percent, e.g. `0.02` for 0.02%.
    #[serde(default)]
    pub maker_fee: Decimal,
    /// Taker fee in percent, e.g. `0.05` for 0.05%.
    #[serde(default)]
    pub taker_fee: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub stats: PairStatistics,
}

fn default_liquidity_tier() -> u8 { 2 }
fn default_max_leverage() -> u32 { 20 }
fn default_active() -> bool { true }

impl TradingPair {
    /// Taker fee charged on `notional`, converting the percent rate.
    pub fn taker_fee_on(&self, notional: Decimal) -> Decimal {
        notional.abs() * self.taker_fee / Decimal::ONE_HUNDRED
    }
}

/// Running performance of all closed trades on a pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairStatistics {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub win_rate: Option<f64>,
    pub average_rr: Option<f64>,
}

impl PairStatistics {
    /// Folds one closed trade into the running figures.
    pub fn record(&mut self, pnl: Decimal, realized_rr: Decimal) {
        let previous = self.total_trades as f64;
        self.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        }
        let total = self.total_trades as f64;
        self.win_rate = Some(self.winning_trades as f64 / total * 100.0);

        let rr = realized_rr.to_f64().unwrap_or(0.0);
        let mean = self.average_rr.unwrap_or(0.0);
        self.average_rr = Some((mean * previous + rr) / total);
    }
}
