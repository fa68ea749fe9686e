use analytics::{
    AnalyticsEngine, AppliedTrades, ProfitFactor, Statistics, StatisticsAggregator, StatisticsKey, TradeOutcome,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_types::{PeriodType, SetupType, Symbol, TradeId, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn outcome(pnl_cents: i64, minutes: i64, setup: usize, pair: usize) -> TradeOutcome {
    let pnl = Decimal::new(pnl_cents, 2);
    TradeOutcome {
        trade_id: TradeId::new(),
        symbol: Symbol::from(["BTCUSDT", "ETHUSDT", "SOLUSDT"][pair]),
        setup_type: SetupType::ALL[setup],
        pnl,
        pnl_percent: pnl / dec!(7),
        realized_rr: pnl / dec!(20),
        commission: dec!(0.35),
        closed_at: epoch() + Duration::minutes(minutes),
        duration_secs: minutes * 13 % 7_200,
    }
}

fn assert_equivalent(incremental: &Statistics, batch: &Statistics) {
    assert_eq!(incremental.total_trades, batch.total_trades);
    assert_eq!(incremental.winning_trades, batch.winning_trades);
    assert_eq!(incremental.losing_trades, batch.losing_trades);
    assert_eq!(incremental.total_pnl, batch.total_pnl);
    assert_eq!(incremental.total_commission, batch.total_commission);
    assert_eq!(incremental.max_win, batch.max_win);
    assert_eq!(incremental.max_loss, batch.max_loss);
    assert_eq!(incremental.average_win, batch.average_win);
    assert_eq!(incremental.average_loss, batch.average_loss);
    assert_eq!(incremental.win_rate, batch.win_rate);
    assert_eq!(incremental.profit_factor, batch.profit_factor);
    assert_eq!(incremental.average_rr, batch.average_rr);
    assert_eq!(incremental.average_duration_secs, batch.average_duration_secs);
    assert_eq!(incremental.max_drawdown, batch.max_drawdown);
    assert_eq!(incremental.max_drawdown_duration_secs, batch.max_drawdown_duration_secs);
    assert_eq!(incremental.by_setup, batch.by_setup);
    assert_eq!(incremental.by_pair, batch.by_pair);
    match (incremental.sharpe_ratio, batch.sharpe_ratio) {
        (Some(a), Some(b)) => assert!((a - b).abs() <= 1e-6 * a.abs().max(1.0), "sharpe {a} vs {b}"),
        (a, b) => assert_eq!(a, b),
    }
}

// ── incremental vs batch ──

proptest! {
    #[test]
    fn incremental_matches_recompute(
        raw in prop::collection::vec((-50_000i64..50_000, 0i64..600, 0usize..3, 0usize..3), 1..60),
    ) {
        let mut minutes = 0;
        let outcomes: Vec<TradeOutcome> = raw
            .into_iter()
            .map(|(pnl, gap, setup, pair)| {
                minutes += gap;
                outcome(pnl, minutes, setup, pair)
            })
            .collect();

        let key = StatisticsKey::containing(UserId(1), PeriodType::AllTime, epoch());
        let aggregator = StatisticsAggregator::new();
        let mut incremental = Statistics::empty(key);
        for o in &outcomes {
            aggregator.apply(&mut incremental, o);
        }
        let batch = AnalyticsEngine::new().recompute(key, &outcomes);
        assert_equivalent(&incremental, &batch);
    }

    #[test]
    fn redelivery_never_changes_a_bucket(
        raw in prop::collection::vec((-50_000i64..50_000, 0i64..600), 1..30),
        replay in prop::collection::vec(any::<prop::sample::Index>(), 1..10),
    ) {
        let mut minutes = 0;
        let outcomes: Vec<TradeOutcome> = raw
            .into_iter()
            .map(|(pnl, gap)| {
                minutes += gap;
                outcome(pnl, minutes, 0, 0)
            })
            .collect();
        let key = StatisticsKey::containing(UserId(1), PeriodType::AllTime, epoch());
        let aggregator = StatisticsAggregator::new();
        let mut ledger = AppliedTrades::new();
        let mut stats = Statistics::empty(key);
        for o in &outcomes {
            prop_assert!(aggregator.apply_once(&mut stats, o, &mut ledger));
        }
        let settled = stats.clone();
        for idx in replay {
            prop_assert!(!aggregator.apply_once(&mut stats, idx.get(&outcomes), &mut ledger));
        }
        prop_assert_eq!(ledger.len(), outcomes.len());
        prop_assert_eq!(stats, settled);
    }
}

// ── bucketing ──

#[test]
fn recompute_ignores_trades_outside_the_period() {
    let inside = outcome(1_000, 60, 0, 0);
    let next_day = outcome(-500, 60 * 30, 0, 0);
    let key = StatisticsKey::containing(UserId(1), PeriodType::Daily, epoch());
    let stats = AnalyticsEngine::new().recompute(key, &[inside.clone(), next_day]);
    assert_eq!(stats.total_trades, 1);
    assert_eq!(stats.total_pnl, inside.pnl);
    assert_eq!(stats.profit_factor, ProfitFactor::Infinite);
}

#[test]
fn empty_history_is_an_empty_bucket() {
    let key = StatisticsKey::containing(UserId(1), PeriodType::Weekly, epoch());
    let stats = AnalyticsEngine::new().recompute(key, &[]);
    assert_eq!(stats, Statistics::empty(key));
}
