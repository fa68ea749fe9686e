// In app/src/report.rs

use crate::replay::ReplaySummary;
use analytics::{ProfitFactor, Statistics};

pub fn print_replay_summary(summary: &ReplaySummary) {
    println!("\n--- Replay Complete ---");
    println!("-----------------------");
    println!("  - Feed entries: {}", summary.entries);
    println!(
        "  - Signals admitted: {} | rejected: {} | errors: {}",
        summary.admitted, summary.rejected, summary.errors
    );
    println!(
        "  - Trades opened: {} | closed: {} | cancelled: {}",
        summary.opened, summary.closed, summary.cancelled
    );
}

/// Helper function to print one statistics bucket.
pub fn print_statistics(stats: &Statistics) {
    let key = &stats.key;
    println!("\n[User {} | {} from {}]", key.user_id, key.period_type, key.period_start.format("%Y-%m-%d"));

    if stats.total_trades == 0 {
        println!("  - No closed trades.");
        return;
    }

    let profit_factor = match stats.profit_factor {
        ProfitFactor::Undefined => "n/a".to_string(),
        ProfitFactor::Infinite => "inf".to_string(),
        ProfitFactor::Finite(value) => format!("{value:.2}"),
    };
    println!(
        "  - Trades: {} (W {} / L {}) | Win rate: {}",
        stats.total_trades,
        stats.winning_trades,
        stats.losing_trades,
        stats.win_rate.map(|r| format!("{r:.1}%")).unwrap_or_else(|| "n/a".into())
    );
    println!(
        "  - P&L: ${:.2} | Fees: ${:.2} | Profit factor: {} | Avg RR: {}",
        stats.total_pnl,
        stats.total_commission,
        profit_factor,
        stats.average_rr.map(|rr| format!("{rr:.2}")).unwrap_or_else(|| "n/a".into())
    );
    println!(
        "  - Max drawdown: ${:.2} over {}s | Sharpe: {}",
        stats.max_drawdown,
        stats.max_drawdown_duration_secs,
        stats.sharpe_ratio.map(|s| format!("{s:.2}")).unwrap_or_else(|| "n/a".into())
    );
    for (setup, breakdown) in &stats.by_setup {
        println!("    * {setup}: {} trades, ${:.2}", breakdown.trades, breakdown.total_pnl);
    }
    for (symbol, breakdown) in &stats.by_pair {
        println!("    * {symbol}: {} trades, ${:.2}", breakdown.trades, breakdown.total_pnl);
    }
}
