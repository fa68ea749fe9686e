// In crates/risk/src/types.rs

use core_types::VolatilityTier;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A user's risk settings, passed by value into every sizing and admission call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Trading budget in the quote currency.
    pub budget: Decimal,
    /// Percent of the budget risked per trade, e.g. `2` for 2%.
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade_percent: Decimal,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_trades: u32,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss_percent: Decimal,
    #[serde(default = "default_max_weekly_drawdown")]
    pub max_weekly_drawdown_percent: Decimal,
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
}

fn default_risk_per_trade() -> Decimal { dec!(2.0) }
fn default_max_concurrent() -> u32 { 3 }
fn default_max_daily_trades() -> u32 { 5 }
fn default_max_daily_loss() -> Decimal { dec!(5.0) }
fn default_max_weekly_drawdown() -> Decimal { dec!(15.0) }
fn default_leverage() -> u32 { 10 }
fn default_max_leverage() -> u32 { 20 }

impl RiskProfile {
    /// A profile with the standard limits and the given budget.
    pub fn with_budget(budget: Decimal) -> Self {
        Self {
            budget,
            risk_per_trade_percent: default_risk_per_trade(),
            max_concurrent_trades: default_max_concurrent(),
            max_daily_trades: default_max_daily_trades(),
            max_daily_loss_percent: default_max_daily_loss(),
            max_weekly_drawdown_percent: default_max_weekly_drawdown(),
            default_leverage: default_leverage(),
            max_leverage: default_max_leverage(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.budget <= Decimal::ZERO {
            return Err("budget must be positive".into());
        }
        if self.risk_per_trade_percent <= Decimal::ZERO || self.risk_per_trade_percent > dec!(100) {
            return Err("risk_per_trade_percent must be in (0, 100]".into());
        }
        if self.max_leverage == 0 || self.default_leverage == 0 {
            return Err("leverage settings must be at least 1".into());
        }
        if self.max_daily_loss_percent <= Decimal::ZERO || self.max_weekly_drawdown_percent <= Decimal::ZERO {
            return Err("loss limits must be positive".into());
        }
        Ok(())
    }
}

/// Leverage ceiling per volatility tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageTable {
    pub low_volatility: u32,
    pub medium_volatility: u32,
    pub high_volatility: u32,
    pub extreme_volatility: u32,
}

impl LeverageTable {
    pub fn multiplier(&self, tier: VolatilityTier) -> u32 {
        match tier {
            VolatilityTier::Low => self.low_volatility,
            VolatilityTier::Medium => self.medium_volatility,
            VolatilityTier::High => self.high_volatility,
            VolatilityTier::Extreme => self.extreme_volatility,
        }
    }
}

impl Default for LeverageTable {
    fn default() -> Self {
        Self {
            low_volatility: 20,
            medium_volatility: 15,
            high_volatility: 10,
            extreme_volatility: 5,
        }
    }
}
