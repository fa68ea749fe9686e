// In crates/database/src/memory.rs

use crate::{Changeset, Error, Result, Store};
use analytics::{AppliedTrades, Statistics, StatisticsKey};
use async_trait::async_trait;
use core_types::{Signal, SignalId, Symbol, Trade, TradeId, TradingPair, UserId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Tables {
    pairs: HashMap<Symbol, TradingPair>,
    signals: HashMap<SignalId, Signal>,
    trades: HashMap<TradeId, Trade>,
    statistics: HashMap<StatisticsKey, Statistics>,
    applied: AppliedTrades,
}

/// A process-local store for paper runs and tests.
///
/// Commits are applied under one lock, so readers never see half a changeset.
/// Failures can be scripted with [`InMemoryStore::fail_next_commits`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    failures: AtomicU32,
    commits: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail without applying anything.
    pub fn fail_next_commits(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn pair(&self, symbol: &Symbol) -> Result<TradingPair> {
        self.tables()
            .pairs
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::not_found("trading pair", symbol))
    }

    async fn pairs(&self) -> Result<Vec<TradingPair>> {
        let mut pairs: Vec<TradingPair> = self.tables().pairs.values().cloned().collect();
        pairs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(pairs)
    }

    async fn signal(&self, id: SignalId) -> Result<Signal> {
        self.tables()
            .signals
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("signal", id))
    }

    async fn trade(&self, id: TradeId) -> Result<Trade> {
        self.tables()
            .trades
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("trade", id))
    }

    async fn trades_for_user(&self, user_id: UserId) -> Result<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .tables()
            .trades
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.created_at);
        Ok(trades)
    }

    async fn active_trades(&self) -> Result<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .tables()
            .trades
            .values()
            .filter(|t| t.status.occupies_slot())
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.created_at);
        Ok(trades)
    }

    async fn statistics(&self, key: &StatisticsKey) -> Result<Option<Statistics>> {
        Ok(self.tables().statistics.get(key).cloned())
    }

    async fn statistics_for_user(&self, user_id: UserId) -> Result<Vec<Statistics>> {
        let mut stats: Vec<Statistics> = self
            .tables()
            .statistics
            .values()
            .filter(|s| s.key.user_id == user_id)
            .cloned()
            .collect();
        stats.sort_by_key(|s| s.key);
        Ok(stats)
    }

    async fn statistics_applied(&self, key: &StatisticsKey, trade_id: TradeId) -> Result<bool> {
        Ok(self.tables().applied.contains(key, trade_id))
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::warn!("Injected commit failure.");
            return Err(Error::Persistence("injected commit failure".to_string()));
        }

        let mut tables = self.tables();
        if let Some((key, trade_id)) = changes.applied.iter().find(|(k, t)| tables.applied.contains(k, *t)) {
            return Err(Error::AlreadyApplied { trade_id: trade_id.to_string(), bucket: key.period_type.to_string() });
        }
        for (key, trade_id) in changes.applied {
            tables.applied.insert(key, trade_id);
        }
        for pair in changes.pairs {
            tables.pairs.insert(pair.symbol.clone(), pair);
        }
        for signal in changes.signals {
            tables.signals.insert(signal.id, signal);
        }
        for trade in changes.trades {
            tables.trades.insert(trade.id, trade);
        }
        for stats in changes.statistics {
            tables.statistics.insert(stats.key, stats);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AssetClass, VolatilityTier};
    use rust_decimal_macros::dec;

    fn pair(symbol: &str) -> TradingPair {
        TradingPair {
            symbol: Symbol::from(symbol),
            base_currency: symbol.trim_end_matches("USDT").to_string(),
            quote_currency: "USDT".into(),
            asset_class: AssetClass::Major,
            volatility_tier: VolatilityTier::Low,
            liquidity_tier: 1,
            min_trade_size: dec!(5),
            max_leverage: 50,
            maker_fee: dec!(0.02),
            taker_fee: dec!(0.04),
            is_active: true,
            stats: Default::default(),
        }
    }

    #[tokio::test]
    async fn commit_upserts_and_reads_back() {
        let store = InMemoryStore::new();
        store.commit(Changeset::new().pair(pair("ETHUSDT")).pair(pair("BTCUSDT"))).await.unwrap();
        let symbols: Vec<String> = store.pairs().await.unwrap().into_iter().map(|p| p.symbol.0).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);

        let mut updated = pair("BTCUSDT");
        updated.is_active = false;
        store.commit(Changeset::new().pair(updated)).await.unwrap();
        assert!(!store.pair(&Symbol::from("BTCUSDT")).await.unwrap().is_active);
        assert_eq!(store.commit_count(), 2);
    }

    #[tokio::test]
    async fn injected_failure_applies_nothing() {
        let store = InMemoryStore::new();
        store.fail_next_commits(1);
        let err = store.commit(Changeset::new().pair(pair("BTCUSDT"))).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(store.pairs().await.unwrap().is_empty());

        store.commit(Changeset::new().pair(pair("BTCUSDT"))).await.unwrap();
        assert_eq!(store.pairs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_rows_are_written_once() {
        let store = InMemoryStore::new();
        let key = StatisticsKey {
            user_id: UserId(1),
            period_type: core_types::PeriodType::AllTime,
            period_start: Default::default(),
        };
        let trade_id = TradeId::new();
        assert!(!store.statistics_applied(&key, trade_id).await.unwrap());

        let bucket = Statistics::empty(key);
        store.commit(Changeset::new().statistics([bucket.clone()]).applied(key, trade_id)).await.unwrap();
        assert!(store.statistics_applied(&key, trade_id).await.unwrap());

        // A second commit for the same trade and bucket lands nothing.
        let mut changed = bucket;
        changed.total_trades = 99;
        let err = store
            .commit(Changeset::new().pair(pair("BTCUSDT")).statistics([changed]).applied(key, trade_id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyApplied { .. }));
        assert_eq!(store.statistics(&key).await.unwrap().unwrap().total_trades, 0);
        assert!(store.pairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = InMemoryStore::new();
        let err = store.trade(TradeId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "trade", .. }));
    }
}
