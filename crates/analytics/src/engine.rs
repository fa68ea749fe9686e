// In crates/analytics/src/engine.rs

use crate::aggregator::{profit_factor, sharpe};
use crate::types::{Breakdown, RunningTotals, Statistics, StatisticsKey, TradeOutcome};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Recomputes statistics buckets from scratch.
///
/// This is the batch counterpart of [`crate::StatisticsAggregator`]. It walks
/// a bucket's full history and is used for audits, backfills and the `stats`
/// command.
#[derive(Default)]
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the bucket `key` from every outcome that falls inside it.
    ///
    /// Outcomes outside the bucket's period are ignored. Duplicate trade ids
    /// are counted once.
    pub fn recompute(&self, key: StatisticsKey, outcomes: &[TradeOutcome]) -> Statistics {
        let mut report = Statistics::empty(key);

        let mut seen = HashSet::with_capacity(outcomes.len());
        let mut trades: Vec<&TradeOutcome> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let in_bucket = crate::types::period_start(key.period_type, outcome.closed_at) == key.period_start;
            if in_bucket && seen.insert(outcome.trade_id) {
                trades.push(outcome);
            }
        }
        if trades.is_empty() {
            return report;
        }
        trades.sort_by_key(|t| t.closed_at);

        // --- Counts and totals ---
        report.total_trades = trades.len() as u32;
        report.total_pnl = trades.iter().map(|t| t.pnl).sum();
        report.total_commission = trades.iter().map(|t| t.commission).sum();

        let winners: Vec<&&TradeOutcome> = trades.iter().filter(|t| t.is_win()).collect();
        let losers: Vec<&&TradeOutcome> = trades.iter().filter(|t| t.is_loss()).collect();
        report.winning_trades = winners.len() as u32;
        report.losing_trades = losers.len() as u32;
        report.max_win = winners.iter().map(|t| t.pnl).max().unwrap_or(Decimal::ZERO);
        report.max_loss = losers.iter().map(|t| t.pnl).min().unwrap_or(Decimal::ZERO);

        let gross_profit: Decimal = winners.iter().map(|t| t.pnl).sum();
        let gross_loss: Decimal = losers.iter().map(|t| t.pnl).sum::<Decimal>().abs();
        let count = Decimal::from(report.total_trades);

        report.win_rate = Some(winners.len() as f64 / trades.len() as f64 * 100.0);
        if !winners.is_empty() {
            report.average_win = Some(gross_profit / Decimal::from(winners.len()));
        }
        if !losers.is_empty() {
            report.average_loss = Some(-gross_loss / Decimal::from(losers.len()));
        }
        report.profit_factor = profit_factor(gross_profit, gross_loss);

        let sum_rr: Decimal = trades.iter().map(|t| t.realized_rr).sum();
        report.average_rr = Some(sum_rr / count);

        let total_duration_secs: i64 = trades.iter().map(|t| t.duration_secs).sum();
        report.average_duration_secs = Some(total_duration_secs / trades.len() as i64);

        // --- Sharpe ratio over per-trade returns ---
        let returns: Vec<Decimal> = trades.iter().map(|t| t.pnl_percent).collect();
        let sum_returns: Decimal = returns.iter().sum();
        let mean_return = sum_returns / count;
        if returns.len() > 1 {
            let variance = returns
                .iter()
                .map(|r| (*r - mean_return) * (*r - mean_return))
                .sum::<Decimal>()
                / count;
            report.sharpe_ratio = sharpe(mean_return, variance);
        }

        // --- Drawdown on cumulative pnl ---
        let mut cumulative = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut peak_time = trades[0].closed_at;
        let mut in_drawdown = false;
        for trade in &trades {
            cumulative += trade.pnl;
            if cumulative >= peak {
                if in_drawdown {
                    let duration = (trade.closed_at - peak_time).num_seconds();
                    report.max_drawdown_duration_secs = report.max_drawdown_duration_secs.max(duration);
                    in_drawdown = false;
                }
                peak = cumulative;
                peak_time = trade.closed_at;
            } else {
                in_drawdown = true;
                report.max_drawdown = report.max_drawdown.max(peak - cumulative);
                let duration = (trade.closed_at - peak_time).num_seconds();
                report.max_drawdown_duration_secs = report.max_drawdown_duration_secs.max(duration);
            }
        }

        // --- Breakdowns ---
        for trade in &trades {
            for slice in [
                report.by_setup.entry(trade.setup_type).or_default(),
                report.by_pair.entry(trade.symbol.clone()).or_default(),
            ] {
                add_to(slice, trade);
            }
        }

        report.running = RunningTotals {
            gross_profit,
            gross_loss,
            sum_rr,
            sum_pnl_percent: sum_returns,
            sum_sq_pnl_percent: returns.iter().map(|r| r * r).sum(),
            sum_duration_secs: total_duration_secs,
            cumulative_pnl: cumulative,
            peak_pnl: peak,
            peak_time: Some(peak_time),
            last_closed_at: trades.last().map(|t| t.closed_at),
        };

        tracing::debug!(
            user_id = key.user_id.0,
            period = %key.period_type,
            trades = report.total_trades,
            "Statistics bucket recomputed."
        );
        report
    }
}

fn add_to(slice: &mut Breakdown, trade: &TradeOutcome) {
    slice.trades += 1;
    slice.total_pnl += trade.pnl;
    if trade.is_win() {
        slice.wins += 1;
    } else if trade.is_loss() {
        slice.losses += 1;
    }
}
