// In crates/risk/src/portfolio.rs

use chrono::{DateTime, Duration, NaiveTime, Utc};
use core_types::{Trade, TradeId, TradeStatus};
use rust_decimal::Decimal;
use serde::Serialize;

/// The slice of a user's portfolio the risk guard looks at.
///
/// Never stored. It is rebuilt from the user's trades whenever it is needed,
/// so it survives restarts without any bookkeeping of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioState {
    /// PENDING, OPEN and PARTIAL_CLOSED trades.
    pub active_trades: u32,
    /// Non-cancelled trades created since the start of the UTC day.
    pub trades_today: u32,
    /// Net realized pnl (exits minus fees) since the start of the UTC day.
    pub realized_pnl_today: Decimal,
    /// Realized equity over the trailing seven days, starting with the
    /// equity at the window start.
    pub weekly_equity: Vec<(DateTime<Utc>, Decimal)>,
    /// Peak-to-current decline of `weekly_equity`, in percent.
    pub weekly_drawdown_percent: Decimal,
}

/// Midnight UTC of the day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl PortfolioState {
    /// Derives the state from a user's trades.
    ///
    /// `exclude` leaves one trade out of the counts, which is how a trade
    /// that is being admitted re-checks the limits against everyone else.
    pub fn derive(
        trades: &[Trade],
        budget: Decimal,
        now: DateTime<Utc>,
        exclude: Option<TradeId>,
    ) -> Self {
        let considered = || trades.iter().filter(move |t| Some(t.id) != exclude);

        let today = day_start(now);
        let tomorrow = today + Duration::days(1);
        let window_start = now - Duration::days(7);

        let active_trades = considered().filter(|t| t.status.occupies_slot()).count() as u32;
        let trades_today = considered()
            .filter(|t| t.status != TradeStatus::Cancelled)
            .filter(|t| t.created_at >= today && t.created_at < tomorrow)
            .count() as u32;
        let realized_pnl_today = considered().map(|t| t.realized_between(today, tomorrow)).sum();

        // Every realized cash flow, in time order.
        let mut flows: Vec<(DateTime<Utc>, Decimal)> = Vec::new();
        for trade in considered() {
            if let Some(entry_time) = trade.entry_time {
                if !trade.entry_commission.is_zero() {
                    flows.push((entry_time, -trade.entry_commission));
                }
            }
            for exit in &trade.exits {
                flows.push((exit.time, exit.net_pnl()));
            }
        }
        flows.sort_by_key(|(time, _)| *time);

        let before_window: Decimal = flows
            .iter()
            .filter(|(time, _)| *time < window_start)
            .map(|(_, amount)| *amount)
            .sum();
        let mut equity = budget + before_window;
        let mut weekly_equity = vec![(window_start, equity)];
        for (time, amount) in flows.iter().filter(|(time, _)| *time >= window_start && *time <= now) {
            equity += *amount;
            weekly_equity.push((*time, equity));
        }

        let peak = weekly_equity
            .iter()
            .map(|(_, value)| *value)
            .max()
            .unwrap_or(budget);
        let weekly_drawdown_percent = if peak > Decimal::ZERO {
            (peak - equity) / peak * Decimal::ONE_HUNDRED
        } else {
            Decimal::ONE_HUNDRED
        };

        Self {
            active_trades,
            trades_today,
            realized_pnl_today,
            weekly_equity,
            weekly_drawdown_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{
        ConfluenceFactor, ExitFill, ExitKind, ExitReason, MarketStructure, SetupType, Side, Signal,
        SignalId, Sizing, Symbol, TimeFrame, UserId,
    };
    use rust_decimal_macros::dec;

    fn trade_with(status: TradeStatus, created_at: DateTime<Utc>) -> Trade {
        let signal = Signal {
            id: SignalId::new(),
            user_id: UserId(1),
            symbol: Symbol::from("ETHUSDT"),
            timeframe: TimeFrame::H1,
            setup_type: SetupType::PocBounce,
            side: Side::Long,
            entry_price: dec!(100),
            stop_loss: dec!(98),
            take_profit: dec!(106),
            confluence_factors: vec![ConfluenceFactor::PocBounce],
            market_structure: MarketStructure::Consolidation,
            target_hint: None,
            created_at,
            valid_until: created_at + Duration::hours(3),
            is_active: false,
            trade_id: None,
            rejection: None,
        };
        let sizing = Sizing {
            risk_amount: dec!(20),
            risk_percent: dec!(2),
            position_size: dec!(1000),
            quantity: dec!(10),
            leverage: 5,
            margin: dec!(200),
        };
        let mut trade = Trade::pending(&signal, &sizing, created_at);
        trade.status = status;
        trade
    }

    fn closed_with_pnl(pnl: Decimal, at: DateTime<Utc>) -> Trade {
        let mut trade = trade_with(TradeStatus::Closed, at - Duration::hours(1));
        trade.entry_time = Some(at - Duration::hours(1));
        trade.exits.push(ExitFill {
            kind: ExitKind::Final(ExitReason::Manual),
            price: dec!(100),
            quantity: dec!(10),
            time: at,
            gross_pnl: pnl,
            fee: Decimal::ZERO,
        });
        trade
    }

    #[test]
    fn counts_slots_and_todays_trades() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap();
        let yesterday = now - Duration::days(1);
        let trades = vec![
            trade_with(TradeStatus::Pending, now),
            trade_with(TradeStatus::Open, now),
            trade_with(TradeStatus::PartialClosed, yesterday),
            trade_with(TradeStatus::Cancelled, now),
            trade_with(TradeStatus::Closed, now),
        ];
        let state = PortfolioState::derive(&trades, dec!(1000), now, None);
        assert_eq!(state.active_trades, 3);
        assert_eq!(state.trades_today, 3);

        let without_first = PortfolioState::derive(&trades, dec!(1000), now, Some(trades[0].id));
        assert_eq!(without_first.active_trades, 2);
    }

    #[test]
    fn realized_pnl_is_bucketed_by_utc_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap();
        let trades = vec![
            closed_with_pnl(dec!(-30), now - Duration::hours(2)),
            closed_with_pnl(dec!(10), now - Duration::hours(20)),
        ];
        let state = PortfolioState::derive(&trades, dec!(1000), now, None);
        assert_eq!(state.realized_pnl_today, dec!(-30));
    }

    #[test]
    fn weekly_drawdown_is_measured_from_window_peak() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let trades = vec![
            closed_with_pnl(dec!(500), now - Duration::days(10)),
            closed_with_pnl(dec!(100), now - Duration::days(3)),
            closed_with_pnl(dec!(-320), now - Duration::days(1)),
        ];
        let state = PortfolioState::derive(&trades, dec!(1000), now, None);
        // Window opens at 1500, peaks at 1600, ends at 1280.
        assert_eq!(state.weekly_equity.first().unwrap().1, dec!(1500));
        assert_eq!(state.weekly_drawdown_percent, dec!(20));
    }
}
