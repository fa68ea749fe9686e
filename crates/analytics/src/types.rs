// In crates/analytics/src/types.rs

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use core_types::{PeriodType, SetupType, Symbol, Trade, TradeId, TradeStatus, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// What the aggregator needs to know about a closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub setup_type: SetupType,
    /// Net of all fees.
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
    pub realized_rr: Decimal,
    pub commission: Decimal,
    pub closed_at: DateTime<Utc>,
    pub duration_secs: i64,
}

impl TradeOutcome {
    /// Extracts the outcome of a CLOSED trade. Anything else yields `None`.
    pub fn from_trade(trade: &Trade) -> Option<Self> {
        if trade.status != TradeStatus::Closed {
            return None;
        }
        Some(Self {
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            setup_type: trade.setup_type,
            pnl: trade.pnl_amount?,
            pnl_percent: trade.pnl_percent?,
            realized_rr: trade.realized_rr?,
            commission: trade.commission,
            closed_at: trade.exit_time?,
            duration_secs: trade.duration_secs.unwrap_or_default(),
        })
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }
}

/// Gross profit over gross loss, with the degenerate cases spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProfitFactor {
    /// Neither profit nor loss yet.
    #[default]
    Undefined,
    /// Profit without a single loss.
    Infinite,
    Finite(f64),
}

/// Identifies one statistics bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatisticsKey {
    pub user_id: UserId,
    pub period_type: PeriodType,
    pub period_start: DateTime<Utc>,
}

impl StatisticsKey {
    /// The bucket of `period_type` that contains `at`.
    pub fn containing(user_id: UserId, period_type: PeriodType, at: DateTime<Utc>) -> Self {
        Self { user_id, period_type, period_start: period_start(period_type, at) }
    }

    /// One key per period type, all containing `at`.
    pub fn all_containing(user_id: UserId, at: DateTime<Utc>) -> [Self; 4] {
        PeriodType::ALL.map(|period_type| Self::containing(user_id, period_type, at))
    }
}

/// Start of the period of `period_type` containing `at`. Weeks start on Monday,
/// all-time buckets at the Unix epoch. All boundaries are UTC midnight.
pub fn period_start(period_type: PeriodType, at: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = |date: NaiveDate| date.and_time(NaiveTime::MIN).and_utc();
    let date = at.date_naive();
    match period_type {
        PeriodType::Daily => midnight(date),
        PeriodType::Weekly => {
            let back = i64::from(date.weekday().num_days_from_monday());
            midnight(date - Duration::days(back))
        }
        PeriodType::Monthly => midnight(date.with_day(1).unwrap_or(date)),
        PeriodType::AllTime => DateTime::<Utc>::UNIX_EPOCH,
    }
}

/// Per-setup or per-pair slice of a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_pnl: Decimal,
}

impl Breakdown {
    pub fn win_rate(&self) -> Option<f64> {
        (self.trades > 0).then(|| f64::from(self.wins) / f64::from(self.trades) * 100.0)
    }
}

/// Running sums that let a bucket absorb one more trade without its history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningTotals {
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub sum_rr: Decimal,
    pub sum_pnl_percent: Decimal,
    pub sum_sq_pnl_percent: Decimal,
    pub sum_duration_secs: i64,
    /// Cumulative pnl of the bucket and its running peak (which starts at zero).
    pub cumulative_pnl: Decimal,
    pub peak_pnl: Decimal,
    pub peak_time: Option<DateTime<Utc>>,
    pub last_closed_at: Option<DateTime<Utc>>,
}

/// Rolling performance of one user over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub key: StatisticsKey,

    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_pnl: Decimal,
    pub total_commission: Decimal,
    pub max_win: Decimal,
    pub max_loss: Decimal,
    pub average_win: Option<Decimal>,
    pub average_loss: Option<Decimal>,
    /// Percent of trades with positive net pnl.
    pub win_rate: Option<f64>,
    pub profit_factor: ProfitFactor,
    pub average_rr: Option<Decimal>,
    /// Mean over population standard deviation of per-trade pnl percent.
    pub sharpe_ratio: Option<f64>,
    /// Largest peak-to-trough fall of cumulative pnl, in quote currency.
    pub max_drawdown: Decimal,
    pub max_drawdown_duration_secs: i64,
    pub average_duration_secs: Option<i64>,

    pub by_setup: BTreeMap<SetupType, Breakdown>,
    pub by_pair: BTreeMap<Symbol, Breakdown>,

    pub running: RunningTotals,
}

impl Statistics {
    pub fn empty(key: StatisticsKey) -> Self {
        Self {
            key,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            total_pnl: Decimal::ZERO,
            total_commission: Decimal::ZERO,
            max_win: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            average_win: None,
            average_loss: None,
            win_rate: None,
            profit_factor: ProfitFactor::Undefined,
            average_rr: None,
            sharpe_ratio: None,
            max_drawdown: Decimal::ZERO,
            max_drawdown_duration_secs: 0,
            average_duration_secs: None,
            by_setup: BTreeMap::new(),
            by_pair: BTreeMap::new(),
            running: RunningTotals::default(),
        }
    }
}

/// Which trades have been folded into which buckets.
///
/// Kept next to the bucket documents rather than inside them, so a bucket's
/// size does not depend on how many trades it has absorbed.
#[derive(Debug, Clone, Default)]
pub struct AppliedTrades(HashSet<(StatisticsKey, TradeId)>);

impl AppliedTrades {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &StatisticsKey, trade_id: TradeId) -> bool {
        self.0.contains(&(*key, trade_id))
    }

    /// Records the pair. Returns `false` if it was already there.
    pub fn insert(&mut self, key: StatisticsKey, trade_id: TradeId) -> bool {
        self.0.insert((key, trade_id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
