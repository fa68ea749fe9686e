// In crates/core-types/src/trade.rs

use crate::signal::Signal;
use crate::types::{
    CancelReason, ConfluenceFactor, ExitReason, OrderId, SetupType, Side, SignalId, Symbol,
    TradeId, TradeStatus, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The output of position sizing, attached to a trade when it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sizing {
    pub risk_amount: Decimal,
    /// Percent of the budget at risk, e.g. `2` for 2%.
    pub risk_percent: Decimal,
    /// Position notional in the quote currency.
    pub position_size: Decimal,
    /// Position size in base units.
    pub quantity: Decimal,
    pub leverage: u32,
    /// Collateral posted for the position (`position_size / leverage`).
    pub margin: Decimal,
}

/// What caused a slice of the position to be exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExitKind {
    /// A partial close at the partial-target with this index.
    Partial(usize),
    Final(ExitReason),
}

/// One executed exit (partial or final) of a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    pub kind: ExitKind,
    pub price: Decimal,
    pub quantity: Decimal,
    pub time: DateTime<Utc>,
    /// Profit before fees.
    pub gross_pnl: Decimal,
    pub fee: Decimal,
}

impl ExitFill {
    pub fn net_pnl(&self) -> Decimal {
        self.gross_pnl - self.fee
    }
}

/// A trade record. Only the lifecycle manager mutates it once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub user_id: UserId,
    pub signal_id: SignalId,
    pub symbol: Symbol,
    pub setup_type: SetupType,
    pub side: Side,
    pub status: TradeStatus,

    pub entry_price: Decimal,
    /// Current protective stop. Moves to entry on breakeven.
    pub stop_loss: Decimal,
    /// The stop at entry. Defines 1R and never moves.
    pub initial_stop_loss: Decimal,
    pub take_profit: Decimal,
    pub position_size: Decimal,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub leverage: u32,

    pub risk_amount: Decimal,
    pub risk_percent: Decimal,
    pub rr_ratio: Decimal,
    pub realized_rr: Option<Decimal>,

    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub cancel_reason: Option<CancelReason>,

    pub pnl_amount: Option<Decimal>,
    pub pnl_percent: Option<Decimal>,
    pub commission: Decimal,
    pub entry_commission: Decimal,

    pub confluence_factors: Vec<ConfluenceFactor>,
    pub confluence_score: u32,

    pub exits: Vec<ExitFill>,
    pub breakeven_moved: bool,

    pub entry_order_id: Option<OrderId>,

    pub signal_time: DateTime<Utc>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub duration_secs: Option<i64>,
}

impl Trade {
    /// Creates a PENDING trade from a signal and its sizing.
    pub fn pending(signal: &Signal, sizing: &Sizing, now: DateTime<Utc>) -> Self {
        Self {
            id: TradeId::new(),
            user_id: signal.user_id,
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            setup_type: signal.setup_type,
            side: signal.side,
            status: TradeStatus::Pending,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            initial_stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            position_size: sizing.position_size,
            quantity: sizing.quantity,
            remaining_quantity: sizing.quantity,
            leverage: sizing.leverage,
            risk_amount: sizing.risk_amount,
            risk_percent: sizing.risk_percent,
            rr_ratio: signal.rr_ratio(),
            realized_rr: None,
            exit_price: None,
            exit_reason: None,
            cancel_reason: None,
            pnl_amount: None,
            pnl_percent: None,
            commission: Decimal::ZERO,
            entry_commission: Decimal::ZERO,
            confluence_factors: signal.confluence_factors.clone(),
            confluence_score: signal.confluence_factors.len() as u32,
            exits: Vec::new(),
            breakeven_moved: false,
            entry_order_id: None,
            signal_time: signal.created_at,
            entry_time: None,
            exit_time: None,
            created_at: now,
            duration_secs: None,
        }
    }

    /// Price distance between entry and the initial stop (1R in price terms).
    pub fn initial_risk_per_unit(&self) -> Decimal {
        (self.entry_price - self.initial_stop_loss).abs()
    }

    /// Unrealized move at `price` expressed in multiples of the initial risk.
    pub fn r_multiple(&self, price: Decimal) -> Decimal {
        let risk = self.initial_risk_per_unit();
        if risk.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) * self.side.sign() / risk
    }

    /// Profit before fees of exiting `quantity` at `price`.
    pub fn gross_pnl_at(&self, price: Decimal, quantity: Decimal) -> Decimal {
        (price - self.entry_price) * quantity * self.side.sign()
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, TradeStatus::Open | TradeStatus::PartialClosed)
    }

    pub fn has_partial(&self, index: usize) -> bool {
        self.exits.iter().any(|e| e.kind == ExitKind::Partial(index))
    }

    pub fn realized_gross(&self) -> Decimal {
        self.exits.iter().map(|e| e.gross_pnl).sum()
    }

    /// Net realized cash flow that landed inside `[from, to)`: exit pnl minus
    /// exit fees, and the entry fee if the fill happened in the window.
    pub fn realized_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
        let in_window = |t: DateTime<Utc>| t >= from && t < to;
        let exits: Decimal = self
            .exits
            .iter()
            .filter(|e| in_window(e.time))
            .map(ExitFill::net_pnl)
            .sum();
        let entry_fee = match self.entry_time {
            Some(t) if in_window(t) => self.entry_commission,
            _ => Decimal::ZERO,
        };
        exits - entry_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketStructure, TimeFrame};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_signal(side: Side, entry: Decimal, stop: Decimal, tp: Decimal) -> Signal {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Signal {
            id: SignalId::new(),
            user_id: UserId(7),
            symbol: Symbol::from("BTCUSDT"),
            timeframe: TimeFrame::H1,
            setup_type: SetupType::OrderBlockReversal,
            side,
            entry_price: entry,
            stop_loss: stop,
            take_profit: tp,
            confluence_factors: vec![
                ConfluenceFactor::OrderBlockBullish,
                ConfluenceFactor::CvdDivergence,
                ConfluenceFactor::LiquidityZone,
            ],
            market_structure: MarketStructure::BullishTrend,
            target_hint: None,
            created_at: at,
            valid_until: at + chrono::Duration::hours(3),
            is_active: true,
            trade_id: None,
            rejection: None,
        }
    }

    fn sizing() -> Sizing {
        Sizing {
            risk_amount: dec!(20),
            risk_percent: dec!(2),
            position_size: dec!(1000),
            quantity: dec!(10),
            leverage: 1,
            margin: dec!(1000),
        }
    }

    #[test]
    fn r_multiple_is_sign_adjusted() {
        let long = Trade::pending(&sample_signal(Side::Long, dec!(100), dec!(98), dec!(108)), &sizing(), Utc::now());
        assert_eq!(long.r_multiple(dec!(102)), dec!(1));
        assert_eq!(long.r_multiple(dec!(97)), dec!(-1.5));

        let short = Trade::pending(&sample_signal(Side::Short, dec!(100), dec!(102), dec!(92)), &sizing(), Utc::now());
        assert_eq!(short.r_multiple(dec!(96)), dec!(2));
        assert_eq!(short.gross_pnl_at(dec!(96), dec!(10)), dec!(40));
    }

    #[test]
    fn pending_trade_copies_signal_levels() {
        let signal = sample_signal(Side::Long, dec!(100), dec!(98), dec!(108));
        let trade = Trade::pending(&signal, &sizing(), Utc::now());
        assert_eq!(trade.status, TradeStatus::Pending);
        assert_eq!(trade.rr_ratio, dec!(4));
        assert_eq!(trade.confluence_score, 3);
        assert_eq!(trade.remaining_quantity, trade.quantity);
        assert_eq!(trade.initial_stop_loss, dec!(98));
    }
}
