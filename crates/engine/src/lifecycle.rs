// In crates/engine/src/lifecycle.rs

use crate::{Error, Result};
use app_config::LifecycleSettings;
use chrono::{DateTime, Utc};
use core_types::{CancelReason, ExitFill, ExitKind, ExitReason, Side, Trade, TradeStatus};
use rust_decimal::Decimal;

/// Something that happened to a trade as the result of one lifecycle call.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Opened,
    PartiallyClosed { target_r: Decimal, fill: ExitFill },
    BreakevenMoved { new_stop: Decimal },
    Closed { reason: ExitReason },
    Cancelled { reason: CancelReason },
}

/// A price level that triggers an action the first time it is reached.
#[derive(Debug, Clone, Copy)]
enum Milestone {
    /// `exhausts` marks the target at which the schedule reaches 100%.
    Partial { index: usize, close_percent: Decimal, exhausts: bool },
    Breakeven,
}

/// Drives trades through PENDING, OPEN, PARTIAL_CLOSED, CLOSED and CANCELLED.
///
/// The manager is pure bookkeeping. It mutates the trade it is handed and
/// reports what changed; the caller owns locking, persistence and I/O. Fees
/// are taker fees in percent of notional.
#[derive(Debug, Clone)]
pub struct TradeLifecycleManager {
    /// Partial targets and the breakeven trigger, sorted by R multiple.
    milestones: Vec<(Decimal, Milestone)>,
}

impl TradeLifecycleManager {
    pub fn new(settings: &LifecycleSettings) -> Self {
        let mut cumulative = Decimal::ZERO;
        let mut milestones: Vec<(Decimal, Milestone)> = settings
            .partial_targets
            .iter()
            .enumerate()
            .map(|(index, t)| {
                cumulative += t.close_percent;
                let exhausts = cumulative >= Decimal::ONE_HUNDRED;
                (t.r_multiple, Milestone::Partial { index, close_percent: t.close_percent, exhausts })
            })
            .collect();
        milestones.push((settings.breakeven_r, Milestone::Breakeven));
        // Stable, so a partial and the breakeven at the same level keep that order.
        milestones.sort_by(|a, b| a.0.cmp(&b.0));
        Self { milestones }
    }

    fn transition(trade: &mut Trade, next: TradeStatus) -> Result<()> {
        if !trade.status.can_transition_to(next) {
            return Err(Error::InvalidTransition { trade_id: trade.id, from: trade.status, to: next });
        }
        tracing::debug!(trade_id = %trade.id, from = %trade.status, to = %next, "Trade transition.");
        trade.status = next;
        Ok(())
    }

    /// PENDING -> OPEN at the actual fill price. Risk and RR are recomputed
    /// against the fill; the stops stay where the signal put them.
    pub fn fill(&self, trade: &mut Trade, price: Decimal, time: DateTime<Utc>, taker_fee: Decimal) -> Result<LifecycleEvent> {
        Self::transition(trade, TradeStatus::Open)?;

        let stop_distance = (price - trade.initial_stop_loss).abs();
        trade.entry_price = price;
        trade.entry_time = Some(time);
        trade.position_size = price * trade.quantity;
        trade.entry_commission = trade.position_size * taker_fee / Decimal::ONE_HUNDRED;
        trade.commission = trade.entry_commission;
        trade.risk_amount = trade.quantity * stop_distance;
        trade.rr_ratio = if stop_distance.is_zero() {
            Decimal::ZERO
        } else {
            (trade.take_profit - price).abs() / stop_distance
        };

        tracing::info!(trade_id = %trade.id, %price, risk_amount = %trade.risk_amount, "Trade opened.");
        Ok(LifecycleEvent::Opened)
    }

    /// PENDING or OPEN -> CANCELLED.
    pub fn cancel(&self, trade: &mut Trade, reason: CancelReason, now: DateTime<Utc>) -> Result<LifecycleEvent> {
        if trade.status == TradeStatus::Open && !trade.exits.is_empty() {
            return Err(Error::InvalidTransition { trade_id: trade.id, from: trade.status, to: TradeStatus::Cancelled });
        }
        Self::transition(trade, TradeStatus::Cancelled)?;
        trade.cancel_reason = Some(reason.clone());
        trade.exit_time = Some(now);
        trade.remaining_quantity = Decimal::ZERO;
        tracing::info!(trade_id = %trade.id, %reason, "Trade cancelled.");
        Ok(LifecycleEvent::Cancelled { reason })
    }

    /// Applies one price tick.
    ///
    /// Order within a tick: stop check, take-profit check, then milestones in
    /// ascending R. Exits are booked at `price`. Ticks on trades that are not
    /// live do nothing.
    pub fn on_price(&self, trade: &mut Trade, price: Decimal, now: DateTime<Utc>, taker_fee: Decimal) -> Result<Vec<LifecycleEvent>> {
        if !trade.is_live() {
            return Ok(Vec::new());
        }

        let (stopped, target_hit) = match trade.side {
            Side::Long => (price <= trade.stop_loss, price >= trade.take_profit),
            Side::Short => (price >= trade.stop_loss, price <= trade.take_profit),
        };
        if stopped {
            let reason = if trade.breakeven_moved { ExitReason::Breakeven } else { ExitReason::StopLoss };
            return Ok(vec![self.close(trade, price, now, reason, taker_fee)?]);
        }
        if target_hit {
            return Ok(vec![self.close(trade, price, now, ExitReason::TakeProfit, taker_fee)?]);
        }

        let r = trade.r_multiple(price);
        let mut events = Vec::new();
        for (level, milestone) in &self.milestones {
            if r < *level {
                break;
            }
            match *milestone {
                Milestone::Partial { index, close_percent, exhausts } => {
                    if trade.has_partial(index) {
                        continue;
                    }
                    // The last slice of a full schedule takes the remainder, rounding included.
                    let quantity = if exhausts {
                        trade.remaining_quantity
                    } else {
                        (trade.quantity * close_percent / Decimal::ONE_HUNDRED).min(trade.remaining_quantity)
                    };
                    if quantity <= Decimal::ZERO {
                        continue;
                    }
                    let fill = Self::book_exit(trade, ExitKind::Partial(index), price, quantity, now, taker_fee);
                    tracing::info!(
                        trade_id = %trade.id,
                        target_r = %level,
                        %quantity,
                        remaining = %trade.remaining_quantity,
                        "Partial target hit."
                    );
                    events.push(LifecycleEvent::PartiallyClosed { target_r: *level, fill });

                    if trade.remaining_quantity.is_zero() {
                        Self::transition(trade, TradeStatus::Closed)?;
                        Self::finalize(trade, price, now, ExitReason::PartialTargets);
                        events.push(LifecycleEvent::Closed { reason: ExitReason::PartialTargets });
                        return Ok(events);
                    }
                    Self::transition(trade, TradeStatus::PartialClosed)?;
                }
                Milestone::Breakeven => {
                    if trade.breakeven_moved {
                        continue;
                    }
                    trade.stop_loss = trade.entry_price;
                    trade.breakeven_moved = true;
                    tracing::info!(trade_id = %trade.id, new_stop = %trade.stop_loss, "Stop moved to breakeven.");
                    events.push(LifecycleEvent::BreakevenMoved { new_stop: trade.stop_loss });
                }
            }
        }
        Ok(events)
    }

    /// Exits whatever is left of a live trade at `price`.
    pub fn close(
        &self,
        trade: &mut Trade,
        price: Decimal,
        now: DateTime<Utc>,
        reason: ExitReason,
        taker_fee: Decimal,
    ) -> Result<LifecycleEvent> {
        Self::transition(trade, TradeStatus::Closed)?;
        let quantity = trade.remaining_quantity;
        Self::book_exit(trade, ExitKind::Final(reason), price, quantity, now, taker_fee);
        Self::finalize(trade, price, now, reason);
        tracing::info!(
            trade_id = %trade.id,
            ?reason,
            pnl = %trade.pnl_amount.unwrap_or_default(),
            "Trade closed."
        );
        Ok(LifecycleEvent::Closed { reason })
    }

    fn book_exit(
        trade: &mut Trade,
        kind: ExitKind,
        price: Decimal,
        quantity: Decimal,
        time: DateTime<Utc>,
        taker_fee: Decimal,
    ) -> ExitFill {
        let fill = ExitFill {
            kind,
            price,
            quantity,
            time,
            gross_pnl: trade.gross_pnl_at(price, quantity),
            fee: price * quantity * taker_fee / Decimal::ONE_HUNDRED,
        };
        trade.remaining_quantity -= quantity;
        trade.commission += fill.fee;
        trade.exits.push(fill.clone());
        fill
    }

    fn finalize(trade: &mut Trade, price: Decimal, now: DateTime<Utc>, reason: ExitReason) {
        let gross = trade.realized_gross();
        let pnl = gross - trade.commission;
        trade.exit_price = Some(price);
        trade.exit_reason = Some(reason);
        trade.exit_time = Some(now);
        trade.pnl_amount = Some(pnl);
        trade.pnl_percent = Some(if trade.position_size.is_zero() {
            Decimal::ZERO
        } else {
            pnl / trade.position_size * Decimal::ONE_HUNDRED
        });
        trade.realized_rr = Some(if trade.risk_amount.is_zero() {
            Decimal::ZERO
        } else {
            gross / trade.risk_amount
        });
        trade.duration_secs = trade.entry_time.map(|entry| (now - entry).num_seconds());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::{
        ConfluenceFactor, MarketStructure, SetupType, Signal, SignalId, Sizing, Symbol, TimeFrame,
        UserId,
    };
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
    }

    fn pending(side: Side, entry: Decimal, stop: Decimal, tp: Decimal) -> Trade {
        let signal = Signal {
            id: SignalId::new(),
            user_id: UserId(1),
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
            created_at: t0(),
            valid_until: t0() + Duration::hours(3),
            is_active: true,
            trade_id: None,
            rejection: None,
        };
        let sizing = Sizing {
            risk_amount: dec!(20),
            risk_percent: dec!(2),
            position_size: dec!(1000),
            quantity: dec!(10),
            leverage: 10,
            margin: dec!(100),
        };
        Trade::pending(&signal, &sizing, t0())
    }

    fn manager() -> TradeLifecycleManager {
        TradeLifecycleManager::new(&LifecycleSettings::default())
    }

    fn open_long() -> Trade {
        let mut trade = pending(Side::Long, dec!(100), dec!(98), dec!(108));
        manager().fill(&mut trade, dec!(100), t0(), Decimal::ZERO).unwrap();
        trade
    }

    #[test]
    fn fill_recomputes_risk_against_actual_price() {
        let mut trade = pending(Side::Long, dec!(100), dec!(98), dec!(108));
        manager().fill(&mut trade, dec!(100.5), t0(), dec!(0.04)).unwrap();
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.entry_price, dec!(100.5));
        assert_eq!(trade.risk_amount, dec!(25));
        assert_eq!(trade.rr_ratio, dec!(3));
        assert_eq!(trade.position_size, dec!(1005));
        assert_eq!(trade.entry_commission, dec!(0.402));
    }

    #[test]
    fn straight_to_target_closes_whole_position() {
        let mut trade = open_long();
        let events = manager().on_price(&mut trade, dec!(108), t0() + Duration::hours(5), Decimal::ZERO).unwrap();
        assert_eq!(events, vec![LifecycleEvent::Closed { reason: ExitReason::TakeProfit }]);
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.pnl_amount, Some(dec!(80)));
        assert_eq!(trade.pnl_percent, Some(dec!(8)));
        assert_eq!(trade.realized_rr, Some(dec!(4)));
        assert_eq!(trade.rr_ratio, dec!(4));
        assert_eq!(trade.duration_secs, Some(5 * 3_600));
    }

    #[test]
    fn partials_take_half_then_thirty_percent_of_original() {
        let lm = manager();
        let mut trade = open_long();

        lm.on_price(&mut trade, dec!(102), t0(), Decimal::ZERO).unwrap();
        assert_eq!(trade.status, TradeStatus::PartialClosed);
        assert_eq!(trade.remaining_quantity, dec!(5));

        // Same level again: nothing fires.
        assert!(lm.on_price(&mut trade, dec!(102.5), t0(), Decimal::ZERO).unwrap().is_empty());
        assert_eq!(trade.remaining_quantity, dec!(5));

        lm.on_price(&mut trade, dec!(104), t0(), Decimal::ZERO).unwrap();
        assert_eq!(trade.remaining_quantity, dec!(2));
        let closed: Decimal = trade.exits.iter().map(|e| e.quantity).sum();
        assert_eq!(closed, dec!(8));

        for _ in 0..5 {
            assert!(lm.on_price(&mut trade, dec!(105), t0(), Decimal::ZERO).unwrap().is_empty());
        }
        assert_eq!(trade.exits.len(), 2);
    }

    #[test]
    fn breakeven_moves_once() {
        let lm = manager();
        let mut trade = open_long();
        let events = lm.on_price(&mut trade, dec!(103), t0(), Decimal::ZERO).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LifecycleEvent::PartiallyClosed { .. }));
        assert_eq!(events[1], LifecycleEvent::BreakevenMoved { new_stop: dec!(100) });
        assert_eq!(trade.stop_loss, dec!(100));
        assert_eq!(trade.initial_stop_loss, dec!(98));

        for price in [dec!(103), dec!(103.5), dec!(103.9)] {
            let events = lm.on_price(&mut trade, price, t0(), Decimal::ZERO).unwrap();
            assert!(!events.iter().any(|e| matches!(e, LifecycleEvent::BreakevenMoved { .. })));
        }
    }

    #[test]
    fn stop_after_breakeven_is_reported_as_breakeven() {
        let lm = manager();
        let mut trade = open_long();
        lm.on_price(&mut trade, dec!(103), t0(), Decimal::ZERO).unwrap();
        let events = lm.on_price(&mut trade, dec!(100), t0() + Duration::hours(1), Decimal::ZERO).unwrap();
        assert_eq!(events, vec![LifecycleEvent::Closed { reason: ExitReason::Breakeven }]);
        // Half the size was banked at 103; the rest went out flat.
        assert_eq!(trade.pnl_amount, Some(dec!(15)));
        assert_eq!(trade.remaining_quantity, Decimal::ZERO);
    }

    #[test]
    fn short_stop_loss_with_fees() {
        let lm = manager();
        let mut trade = pending(Side::Short, dec!(100), dec!(102), dec!(92));
        lm.fill(&mut trade, dec!(100), t0(), dec!(0.05)).unwrap();
        lm.on_price(&mut trade, dec!(102), t0() + Duration::minutes(30), dec!(0.05)).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_reason, Some(ExitReason::StopLoss));
        // -20 gross, 0.5 entry fee, 0.51 exit fee.
        assert_eq!(trade.pnl_amount, Some(dec!(-21.01)));
        assert_eq!(trade.realized_rr, Some(dec!(-1)));
    }

    #[test]
    fn full_partial_schedule_closes_the_trade() {
        let settings = LifecycleSettings {
            partial_targets: vec![
                app_config::PartialTarget { r_multiple: dec!(1), close_percent: dec!(50) },
                app_config::PartialTarget { r_multiple: dec!(2), close_percent: dec!(50) },
            ],
            breakeven_r: dec!(1.5),
        };
        let lm = TradeLifecycleManager::new(&settings);
        let mut trade = open_long();
        let events = lm.on_price(&mut trade, dec!(104), t0(), Decimal::ZERO).unwrap();
        assert_eq!(events.last(), Some(&LifecycleEvent::Closed { reason: ExitReason::PartialTargets }));
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.pnl_amount, Some(dec!(40)));
    }

    #[test]
    fn last_slice_of_a_full_schedule_takes_the_rounding_remainder() {
        let settings = LifecycleSettings {
            partial_targets: vec![
                app_config::PartialTarget { r_multiple: dec!(1), close_percent: dec!(50) },
                app_config::PartialTarget { r_multiple: dec!(2), close_percent: dec!(50) },
            ],
            breakeven_r: dec!(3),
        };
        let lm = TradeLifecycleManager::new(&settings);
        let mut trade = open_long();
        // Half of this does not fit in 28 decimal places.
        let quantity = dec!(0.1234567890123456789012345677);
        trade.quantity = quantity;
        trade.remaining_quantity = quantity;

        lm.on_price(&mut trade, dec!(102), t0(), Decimal::ZERO).unwrap();
        assert_eq!(trade.status, TradeStatus::PartialClosed);

        let events = lm.on_price(&mut trade, dec!(104), t0() + Duration::hours(1), Decimal::ZERO).unwrap();
        assert_eq!(events.last(), Some(&LifecycleEvent::Closed { reason: ExitReason::PartialTargets }));
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.remaining_quantity, Decimal::ZERO);
        let booked: Decimal = trade.exits.iter().map(|e| e.quantity).sum();
        assert_eq!(booked, quantity);
    }

    #[test]
    fn illegal_moves_are_rejected() {
        let lm = manager();
        let mut trade = open_long();
        lm.close(&mut trade, dec!(101), t0(), ExitReason::Manual, Decimal::ZERO).unwrap();

        let err = lm.fill(&mut trade, dec!(100), t0(), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { from: TradeStatus::Closed, to: TradeStatus::Open, .. }));
        assert!(lm.cancel(&mut trade, CancelReason::Expired, t0()).is_err());
        // Ticks on terminal trades are ignored.
        assert!(lm.on_price(&mut trade, dec!(90), t0(), Decimal::ZERO).unwrap().is_empty());
    }

    #[test]
    fn pending_and_open_can_be_cancelled() {
        let lm = manager();
        let mut pending_trade = pending(Side::Long, dec!(100), dec!(98), dec!(108));
        lm.cancel(&mut pending_trade, CancelReason::Expired, t0()).unwrap();
        assert_eq!(pending_trade.status, TradeStatus::Cancelled);

        let mut open = open_long();
        lm.cancel(&mut open, CancelReason::Invalidated("structure flipped".into()), t0()).unwrap();
        assert_eq!(open.cancel_reason, Some(CancelReason::Invalidated("structure flipped".into())));

        let mut scaled = open_long();
        lm.on_price(&mut scaled, dec!(102), t0(), Decimal::ZERO).unwrap();
        assert!(lm.cancel(&mut scaled, CancelReason::Expired, t0()).is_err());
    }
}
