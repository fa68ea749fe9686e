// In crates/analytics/src/aggregator.rs

use crate::types::{AppliedTrades, Breakdown, ProfitFactor, RunningTotals, Statistics, TradeOutcome};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

/// Variance of per-trade pnl percent below which the Sharpe ratio is undefined.
pub(crate) const MIN_VARIANCE: Decimal = dec!(0.000000000001);

/// Folds closed trades into statistics buckets one at a time.
///
/// Each call touches only the bucket's counters and running sums, so the cost
/// of an update does not grow with the bucket's history. Which trades a
/// bucket has absorbed is tracked outside it, in an [`AppliedTrades`] ledger
/// or the store's equivalent.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatisticsAggregator;

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Applies `outcome` to `stats` unless `ledger` shows the trade already
    /// counted in that bucket. Returns `false` for a redelivery.
    pub fn apply_once(&self, stats: &mut Statistics, outcome: &TradeOutcome, ledger: &mut AppliedTrades) -> bool {
        if !ledger.insert(stats.key, outcome.trade_id) {
            tracing::debug!(
                trade_id = %outcome.trade_id,
                period = %stats.key.period_type,
                "Trade already counted in bucket, skipping."
            );
            return false;
        }
        self.apply(stats, outcome);
        true
    }

    /// Folds `outcome` into `stats`. The caller ensures each trade reaches a bucket once.
    pub fn apply(&self, stats: &mut Statistics, outcome: &TradeOutcome) {
        let pnl = outcome.pnl;
        stats.total_trades += 1;
        stats.total_pnl += pnl;
        stats.total_commission += outcome.commission;
        if outcome.is_win() {
            stats.winning_trades += 1;
            stats.max_win = stats.max_win.max(pnl);
        } else if outcome.is_loss() {
            stats.losing_trades += 1;
            stats.max_loss = stats.max_loss.min(pnl);
        }

        for slice in [
            stats.by_setup.entry(outcome.setup_type).or_default(),
            stats.by_pair.entry(outcome.symbol.clone()).or_default(),
        ] {
            record(slice, outcome);
        }

        let r = &mut stats.running;
        if outcome.is_win() {
            r.gross_profit += pnl;
        } else if outcome.is_loss() {
            r.gross_loss -= pnl;
        }
        r.sum_rr += outcome.realized_rr;
        r.sum_pnl_percent += outcome.pnl_percent;
        r.sum_sq_pnl_percent += outcome.pnl_percent * outcome.pnl_percent;
        r.sum_duration_secs += outcome.duration_secs;
        r.last_closed_at = Some(outcome.closed_at);

        // --- Drawdown on cumulative pnl ---
        let peak_time = *r.peak_time.get_or_insert(outcome.closed_at);
        let was_under = r.cumulative_pnl < r.peak_pnl;
        r.cumulative_pnl += pnl;
        if r.cumulative_pnl < r.peak_pnl || was_under {
            let duration = (outcome.closed_at - peak_time).num_seconds();
            stats.max_drawdown_duration_secs = stats.max_drawdown_duration_secs.max(duration);
        }
        if r.cumulative_pnl >= r.peak_pnl {
            r.peak_pnl = r.cumulative_pnl;
            r.peak_time = Some(outcome.closed_at);
        } else {
            stats.max_drawdown = stats.max_drawdown.max(r.peak_pnl - r.cumulative_pnl);
        }

        refresh_ratios(stats);
    }
}

fn record(slice: &mut Breakdown, outcome: &TradeOutcome) {
    slice.trades += 1;
    slice.total_pnl += outcome.pnl;
    if outcome.is_win() {
        slice.wins += 1;
    } else if outcome.is_loss() {
        slice.losses += 1;
    }
}

/// Recomputes the derived ratios from counters and running sums.
fn refresh_ratios(stats: &mut Statistics) {
    let RunningTotals { gross_profit, gross_loss, sum_rr, sum_pnl_percent, sum_sq_pnl_percent, sum_duration_secs, .. } =
        stats.running.clone();
    let n = stats.total_trades;
    if n == 0 {
        return;
    }
    let count = Decimal::from(n);

    stats.win_rate = Some(f64::from(stats.winning_trades) / f64::from(n) * 100.0);
    stats.average_win = (stats.winning_trades > 0).then(|| gross_profit / Decimal::from(stats.winning_trades));
    stats.average_loss = (stats.losing_trades > 0).then(|| -gross_loss / Decimal::from(stats.losing_trades));
    stats.average_rr = Some(sum_rr / count);
    stats.average_duration_secs = Some(sum_duration_secs / i64::from(n));
    stats.profit_factor = profit_factor(gross_profit, gross_loss);

    stats.sharpe_ratio = if n < 2 {
        None
    } else {
        let mean = sum_pnl_percent / count;
        let variance = sum_sq_pnl_percent / count - mean * mean;
        sharpe(mean, variance)
    };
}

pub(crate) fn profit_factor(gross_profit: Decimal, gross_loss: Decimal) -> ProfitFactor {
    match (gross_profit.is_zero(), gross_loss.is_zero()) {
        (true, true) => ProfitFactor::Undefined,
        (false, true) => ProfitFactor::Infinite,
        _ => ProfitFactor::Finite((gross_profit / gross_loss).to_f64().unwrap_or(0.0)),
    }
}

pub(crate) fn sharpe(mean: Decimal, variance: Decimal) -> Option<f64> {
    if variance <= MIN_VARIANCE {
        return None;
    }
    let std_dev = variance.to_f64()?.sqrt();
    Some(mean.to_f64()? / std_dev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatisticsKey;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use core_types::{PeriodType, SetupType, Symbol, TradeId, UserId};

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn outcome(pnl: Decimal, hour: i64) -> TradeOutcome {
        TradeOutcome {
            trade_id: TradeId::new(),
            symbol: Symbol::from("BTCUSDT"),
            setup_type: SetupType::OrderBlockReversal,
            pnl,
            pnl_percent: pnl / dec!(10),
            realized_rr: pnl / dec!(20),
            commission: dec!(0.5),
            closed_at: at(hour),
            duration_secs: 3_600,
        }
    }

    fn bucket() -> Statistics {
        Statistics::empty(StatisticsKey::containing(UserId(1), PeriodType::AllTime, at(0)))
    }

    #[test]
    fn duplicate_delivery_is_a_no_op() {
        let aggregator = StatisticsAggregator::new();
        let mut ledger = AppliedTrades::new();
        let mut stats = bucket();
        let win = outcome(dec!(40), 1);
        assert!(aggregator.apply_once(&mut stats, &win, &mut ledger));
        let snapshot = stats.clone();
        assert!(!aggregator.apply_once(&mut stats, &win, &mut ledger));
        assert_eq!(stats, snapshot);
        assert!(ledger.contains(&stats.key, win.trade_id));
    }

    #[test]
    fn ledger_is_per_bucket() {
        let aggregator = StatisticsAggregator::new();
        let mut ledger = AppliedTrades::new();
        let win = outcome(dec!(40), 1);
        let mut all_time = bucket();
        let mut daily = Statistics::empty(StatisticsKey::containing(UserId(1), PeriodType::Daily, at(1)));
        assert!(aggregator.apply_once(&mut all_time, &win, &mut ledger));
        assert!(aggregator.apply_once(&mut daily, &win, &mut ledger));
        assert_eq!(ledger.len(), 2);
        assert_eq!(daily.total_trades, 1);
    }

    #[test]
    fn counts_and_ratios() {
        let aggregator = StatisticsAggregator::new();
        let mut stats = bucket();
        for (pnl, hour) in [(dec!(40), 1), (dec!(-20), 2), (dec!(60), 3), (dec!(0), 4)] {
            aggregator.apply(&mut stats, &outcome(pnl, hour));
        }
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.total_pnl, dec!(80));
        assert_eq!(stats.total_commission, dec!(2));
        assert_eq!(stats.max_win, dec!(60));
        assert_eq!(stats.max_loss, dec!(-20));
        assert_eq!(stats.average_win, Some(dec!(50)));
        assert_eq!(stats.average_loss, Some(dec!(-20)));
        assert_eq!(stats.win_rate, Some(50.0));
        assert_eq!(stats.profit_factor, ProfitFactor::Finite(5.0));
        assert_eq!(stats.average_rr, Some(dec!(1)));
        assert_eq!(stats.by_setup[&SetupType::OrderBlockReversal].trades, 4);
        assert!(stats.sharpe_ratio.is_some());
    }

    #[test]
    fn profit_factor_edge_cases() {
        assert_eq!(profit_factor(Decimal::ZERO, Decimal::ZERO), ProfitFactor::Undefined);
        assert_eq!(profit_factor(dec!(10), Decimal::ZERO), ProfitFactor::Infinite);
        assert_eq!(profit_factor(Decimal::ZERO, dec!(10)), ProfitFactor::Finite(0.0));
    }

    #[test]
    fn identical_returns_have_no_sharpe() {
        let aggregator = StatisticsAggregator::new();
        let mut stats = bucket();
        for hour in 1..=3 {
            aggregator.apply(&mut stats, &outcome(dec!(10), hour));
        }
        assert_eq!(stats.sharpe_ratio, None);
    }

    #[test]
    fn drawdown_depth_and_duration() {
        let aggregator = StatisticsAggregator::new();
        let mut stats = bucket();
        // Peak of 50 at hour 1, trough of 10 at hour 3, recovered at hour 6.
        for (pnl, hour) in [(dec!(50), 1), (dec!(-30), 2), (dec!(-10), 3), (dec!(45), 6)] {
            aggregator.apply(&mut stats, &outcome(pnl, hour));
        }
        assert_eq!(stats.max_drawdown, dec!(40));
        assert_eq!(stats.max_drawdown_duration_secs, 5 * 3_600);
    }
}
