// In crates/database/src/changeset.rs

use analytics::{Statistics, StatisticsKey};
use core_types::{Signal, Trade, TradeId, TradingPair};

/// A batch of upserts applied as one unit. Either all of it lands or none.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub signals: Vec<Signal>,
    pub trades: Vec<Trade>,
    pub statistics: Vec<Statistics>,
    pub pairs: Vec<TradingPair>,
    /// Ledger rows: `trade_id` has been folded into the bucket `key`. A commit
    /// carrying a row that already exists fails as a whole.
    pub applied: Vec<(StatisticsKey, TradeId)>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn trade(mut self, trade: Trade) -> Self {
        self.trades.push(trade);
        self
    }

    pub fn statistics(mut self, stats: impl IntoIterator<Item = Statistics>) -> Self {
        self.statistics.extend(stats);
        self
    }

    pub fn pair(mut self, pair: TradingPair) -> Self {
        self.pairs.push(pair);
        self
    }

    pub fn applied(mut self, key: StatisticsKey, trade_id: TradeId) -> Self {
        self.applied.push((key, trade_id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
            && self.trades.is_empty()
            && self.statistics.is_empty()
            && self.pairs.is_empty()
            && self.applied.is_empty()
    }
}
