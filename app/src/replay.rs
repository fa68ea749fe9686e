// In app/src/replay.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use confluence::IndicatorSnapshot;
use core_types::{Symbol, TradeStatus, UserId};
use engine::{BatchReport, Engine};
use execution::SimulatedExchange;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// One timestamped line of a paper-trading feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: FeedEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Indicator output to evaluate for a user.
    Snapshot { user_id: UserId, snapshot: IndicatorSnapshot },
    /// A traded price. Also moves the simulated exchange's mark.
    Tick { symbol: Symbol, price: Decimal },
    /// Check every pending entry order for a fill or expiry.
    Poll,
    /// Market structure changed: drop a user's unfilled trades on `symbol`.
    Invalidate { user_id: UserId, symbol: Symbol, reason: String },
    /// Close a user's live trades on `symbol` at `price`.
    Close { user_id: UserId, symbol: Symbol, price: Decimal },
    DailySummary { user_id: UserId },
}

/// Counters printed at the end of a replay.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub entries: usize,
    pub admitted: usize,
    pub rejected: usize,
    pub opened: usize,
    pub closed: usize,
    pub cancelled: usize,
    pub errors: usize,
    pub users: BTreeSet<UserId>,
    pub last_at: Option<DateTime<Utc>>,
}

impl ReplaySummary {
    fn absorb(&mut self, report: BatchReport) {
        for trade in &report.updated {
            match trade.status {
                TradeStatus::Open => self.opened += 1,
                TradeStatus::Closed => self.closed += 1,
                TradeStatus::Cancelled => self.cancelled += 1,
                _ => {}
            }
        }
        self.errors += report.failed.len();
    }
}

/// Reads a JSON array of feed entries, ordered by time.
pub fn load_feed(path: &Path) -> Result<Vec<FeedEntry>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading feed {}", path.display()))?;
    let mut entries: Vec<FeedEntry> = serde_json::from_str(&content).context("parsing feed")?;
    entries.sort_by_key(|e| e.at);
    Ok(entries)
}

/// Drives the engine through `entries`.
///
/// Rejections and exchange failures are counted and logged. Only store
/// failures on batch operations abort the replay.
pub async fn run(engine: &Engine, exchange: &SimulatedExchange, entries: Vec<FeedEntry>) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for entry in entries {
        let at = entry.at;
        exchange.set_clock(at);
        summary.entries += 1;
        summary.last_at = Some(at);

        match entry.event {
            FeedEvent::Snapshot { user_id, snapshot } => {
                summary.users.insert(user_id);
                match engine.submit_snapshot(user_id, snapshot, at).await {
                    Ok(trade) => {
                        summary.admitted += 1;
                        tracing::info!(%at, trade_id = %trade.id, symbol = %trade.symbol, "Trade submitted.");
                    }
                    Err(e) if e.is_rejection() => {
                        summary.rejected += 1;
                        tracing::info!(%at, %user_id, code = e.code(), "Snapshot rejected.");
                    }
                    Err(e) => {
                        summary.errors += 1;
                        tracing::warn!(%at, %user_id, code = e.code(), error = %e, "Snapshot failed.");
                    }
                }
            }
            FeedEvent::Tick { symbol, price } => {
                exchange.set_mark(&symbol, price);
                summary.absorb(engine.on_price(&symbol, price, at).await?);
            }
            FeedEvent::Poll => {
                summary.absorb(engine.poll_pending(at).await?);
            }
            FeedEvent::Invalidate { user_id, symbol, reason } => {
                for trade in engine.store().trades_for_user(user_id).await? {
                    if trade.symbol != symbol || trade.status != TradeStatus::Pending {
                        continue;
                    }
                    match engine.invalidate(trade.id, reason.clone(), at).await {
                        Ok(_) => summary.cancelled += 1,
                        Err(e) => {
                            summary.errors += 1;
                            tracing::warn!(trade_id = %trade.id, error = %e, "Invalidation failed.");
                        }
                    }
                }
            }
            FeedEvent::Close { user_id, symbol, price } => {
                for trade in engine.store().trades_for_user(user_id).await? {
                    if trade.symbol != symbol || !trade.is_live() {
                        continue;
                    }
                    match engine.close_manually(trade.id, price, at).await {
                        Ok(_) => summary.closed += 1,
                        Err(e) => {
                            summary.errors += 1;
                            tracing::warn!(trade_id = %trade.id, error = %e, "Manual close failed.");
                        }
                    }
                }
            }
            FeedEvent::DailySummary { user_id } => {
                engine.daily_summary(user_id, at).await?;
            }
        }
    }

    Ok(summary)
}
