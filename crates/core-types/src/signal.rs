// In crates/core-types/src/signal.rs

use crate::types::{
    ConfluenceFactor, MarketStructure, SetupType, Side, SignalId, Symbol, TimeFrame, TradeId,
    UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A qualified trade idea produced by the confluence evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub setup_type: SetupType,
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub confluence_factors: Vec<ConfluenceFactor>,
    pub market_structure: MarketStructure,
    /// Target suggested by the detector. Informational; the take profit is
    /// always derived from the setup's RR ratio.
    pub target_hint: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub trade_id: Option<TradeId>,
    pub rejection: Option<SignalRejection>,
}

/// Why an emitted signal did not become a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRejection {
    pub code: String,
    pub message: String,
}

impl Signal {
    pub fn stop_distance(&self) -> Decimal {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Stop distance as a fraction of entry (`0.02` for a 2% stop).
    pub fn stop_fraction(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.stop_distance() / self.entry_price
    }

    /// Sign-adjusted `(take_profit - entry) / (entry - stop)`.
    pub fn rr_ratio(&self) -> Decimal {
        let risk = (self.entry_price - self.stop_loss) * self.side.sign();
        if risk.is_zero() {
            return Decimal::ZERO;
        }
        (self.take_profit - self.entry_price) * self.side.sign() / risk
    }

    pub fn confluence_score(&self) -> usize {
        self.confluence_factors.len()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Marks the signal as promoted to `trade_id`.
    pub fn promote(&mut self, trade_id: TradeId) {
        self.is_active = false;
        self.trade_id = Some(trade_id);
    }

    pub fn reject(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.is_active = false;
        self.rejection = Some(SignalRejection { code: code.into(), message: message.into() });
    }
}
