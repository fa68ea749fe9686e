// In crates/database/src/lib.rs

use analytics::{Statistics, StatisticsKey};
use async_trait::async_trait;
use core_types::{Signal, SignalId, Symbol, Trade, TradeId, TradingPair, UserId};

pub mod changeset;
pub mod error;
pub mod memory;
pub mod postgres;

// Re-export the most important types for easy access.
pub use changeset::Changeset;
pub use error::{Error, Result};
pub use memory::InMemoryStore;
pub use postgres::{PgStore, connect};

/// Durable storage for pairs, signals, trades and statistics.
///
/// Reads return owned snapshots. All writes go through [`Store::commit`],
/// which applies a whole [`Changeset`] or nothing.
#[async_trait]
pub trait Store: Send + Sync {
    async fn pair(&self, symbol: &Symbol) -> Result<TradingPair>;

    async fn pairs(&self) -> Result<Vec<TradingPair>>;

    async fn signal(&self, id: SignalId) -> Result<Signal>;

    async fn trade(&self, id: TradeId) -> Result<Trade>;

    /// Every trade of a user, oldest first.
    async fn trades_for_user(&self, user_id: UserId) -> Result<Vec<Trade>>;

    /// PENDING, OPEN and PARTIAL_CLOSED trades of all users, oldest first.
    async fn active_trades(&self) -> Result<Vec<Trade>>;

    async fn statistics(&self, key: &StatisticsKey) -> Result<Option<Statistics>>;

    async fn statistics_for_user(&self, user_id: UserId) -> Result<Vec<Statistics>>;

    /// Whether `trade_id` has already been folded into the bucket `key`.
    async fn statistics_applied(&self, key: &StatisticsKey, trade_id: TradeId) -> Result<bool>;

    async fn commit(&self, changes: Changeset) -> Result<()>;
}
