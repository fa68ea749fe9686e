// In crates/engine/src/lib.rs

pub mod error;
pub mod lifecycle;
pub mod locks;

// Re-export public types
pub use error::{Error, Result};
pub use lifecycle::{LifecycleEvent, TradeLifecycleManager};
pub use locks::UserLocks;

use analytics::{AnalyticsEngine, Statistics, StatisticsAggregator, StatisticsKey, TradeOutcome};
use app_config::{QualitySettings, Settings, UserConfig};
use chrono::{DateTime, Utc};
use confluence::{ConfluenceEvaluator, EvaluationContext, IndicatorProvider, IndicatorSnapshot};
use core_types::{
    CancelReason, ExitReason, OrderId, PeriodType, Signal, Symbol, TimeFrame, Trade, TradeId,
    TradeStatus, TradingPair, UserId,
};
use database::{Changeset, Store};
use events::{
    BreakevenMoved, DailySummary, NotificationBus, NotificationEvent, SignalEmitted, SignalRejected,
    TradeCancelled, TradeClosed, TradeOpened, TradePartiallyClosed,
};
use execution::{ExchangeClient, FillStatus, OrderRequest, OrderType, RetryPolicy, with_retry};
use futures::future;
use risk::{PortfolioRiskGuard, PortfolioState, RiskSizer};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;

/// Outcome of a call that touches many trades. One trade failing does not
/// stop the others.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub updated: Vec<Trade>,
    pub failed: Vec<(TradeId, Error)>,
}

/// The signal-to-close orchestrator.
///
/// Evaluation and sizing are pure and may run concurrently for any number of
/// pairs. Everything that reads or changes a user's portfolio runs inside
/// that user's lock, and exchange calls always happen outside it.
pub struct Engine {
    evaluator: ConfluenceEvaluator,
    sizer: RiskSizer,
    guard: PortfolioRiskGuard,
    lifecycle: TradeLifecycleManager,
    aggregator: StatisticsAggregator,
    quality: QualitySettings,
    retry: RetryPolicy,

    store: Arc<dyn Store>,
    exchange: Arc<dyn ExchangeClient>,
    bus: NotificationBus,

    locks: UserLocks,
    /// Pair statistics are shared between users.
    pair_stats: AsyncMutex<()>,
    users: RwLock<HashMap<UserId, Arc<UserConfig>>>,
}

impl Engine {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn Store>,
        exchange: Arc<dyn ExchangeClient>,
        bus: NotificationBus,
    ) -> Self {
        tracing::info!(exchange = exchange.name(), "Initializing engine.");
        Self {
            evaluator: ConfluenceEvaluator::new(Arc::new(settings.confluence.clone())),
            sizer: RiskSizer::new(Arc::new(settings.leverage.clone())),
            guard: PortfolioRiskGuard::new(),
            lifecycle: TradeLifecycleManager::new(&settings.lifecycle),
            aggregator: StatisticsAggregator::new(),
            quality: settings.quality,
            retry: settings.engine.retry.clone(),
            store,
            exchange,
            bus,
            locks: UserLocks::new(),
            pair_stats: AsyncMutex::new(()),
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // --- User configuration ---

    /// Installs or replaces a user's configuration. Calls already in flight
    /// keep the snapshot they started with.
    pub fn apply_user_config(&self, config: UserConfig) -> Result<()> {
        config.validate().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        tracing::info!(user_id = %config.user_id, trading_enabled = config.trading_enabled, "User configuration applied.");
        let mut users = self.users.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        users.insert(config.user_id, Arc::new(config));
        Ok(())
    }

    pub fn user_config(&self, user_id: UserId) -> Result<Arc<UserConfig>> {
        let users = self.users.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        users.get(&user_id).cloned().ok_or(Error::UnknownUser(user_id))
    }

    // --- Signal evaluation ---

    /// Qualifies a snapshot for a user without touching the portfolio.
    pub async fn evaluate(&self, user_id: UserId, snapshot: &IndicatorSnapshot) -> Result<Signal> {
        let config = self.user_config(user_id)?;
        let (_, signal) = self.qualify(&config, snapshot).await?;
        Ok(signal)
    }

    async fn qualify(&self, config: &UserConfig, snapshot: &IndicatorSnapshot) -> Result<(TradingPair, Signal)> {
        if !config.trading_enabled {
            return Err(Error::TradingDisabled(config.user_id));
        }
        let pair = match self.store.pair(&snapshot.symbol).await {
            Ok(pair) => pair,
            Err(database::Error::NotFound { .. }) => return Err(Error::UnknownPair(snapshot.symbol.clone())),
            Err(e) => return Err(e.into()),
        };
        if !pair.is_active || !config.trades_pair(&pair.symbol) {
            return Err(Error::PairDisabled(pair.symbol));
        }

        let ctx = EvaluationContext {
            user_id: config.user_id,
            pair: &pair,
            enabled_setups: &config.enabled_setups,
            min_rr_ratio: config.min_rr_ratio,
            min_confluence: config.min_confluence,
        };
        let signal = self.evaluator.evaluate(snapshot, ctx)?;
        Ok((pair, signal))
    }

    /// Asks `provider` for a snapshot and, if there is one, runs it through
    /// [`Engine::submit_snapshot`]. No data is not an error.
    pub async fn scan(
        &self,
        provider: &dyn IndicatorProvider,
        user_id: UserId,
        symbol: &Symbol,
        timeframe: TimeFrame,
        now: DateTime<Utc>,
    ) -> Result<Option<Trade>> {
        match provider.snapshot(symbol, timeframe, now).await {
            Some(snapshot) => self.submit_snapshot(user_id, snapshot, now).await.map(Some),
            None => {
                tracing::trace!(provider = provider.name(), %symbol, %timeframe, "No snapshot.");
                Ok(None)
            }
        }
    }

    /// Evaluates, admits, sizes and places a new trade.
    ///
    /// Returns the PENDING trade with its entry order id. Rejections are
    /// returned as errors and published as `SignalRejected`.
    pub async fn submit_snapshot(&self, user_id: UserId, snapshot: IndicatorSnapshot, now: DateTime<Utc>) -> Result<Trade> {
        let config = self.user_config(user_id)?;
        let (pair, signal) = match self.qualify(&config, &snapshot).await {
            Ok(qualified) => qualified,
            Err(e) => {
                if e.is_rejection() {
                    self.publish_rejection(&config, None, &snapshot.symbol, &e);
                }
                return Err(e);
            }
        };
        tracing::info!(
            user_id = %user_id,
            symbol = %signal.symbol,
            setup = %signal.setup_type,
            side = ?signal.side,
            entry = %signal.entry_price,
            stop = %signal.stop_loss,
            take_profit = %signal.take_profit,
            "Signal qualified."
        );

        let trade = self.admit(&config, &pair, signal, now).await?;
        self.place_entry(&config, trade, now).await
    }

    // --- Admission ---

    /// The admission critical section: guard, size, create the PENDING trade.
    async fn admit(&self, config: &UserConfig, pair: &TradingPair, mut signal: Signal, now: DateTime<Utc>) -> Result<Trade> {
        let guard = self.locks.lock(config.user_id).await;

        if let Err(e) = self.check_setup_quality(config.user_id, &signal).await {
            drop(guard);
            return Err(self.reject(config, signal, e).await);
        }

        let trades = self.store.trades_for_user(config.user_id).await?;
        let state = PortfolioState::derive(&trades, config.risk.budget, now, None);
        let admitted = self
            .guard
            .check(&state, &config.risk)
            .and_then(|()| self.sizer.size(&signal, pair, &config.risk));
        let sizing = match admitted {
            Ok(sizing) => sizing,
            Err(e) => {
                drop(guard);
                return Err(self.reject(config, signal, e.into()).await);
            }
        };

        let trade = Trade::pending(&signal, &sizing, now);
        signal.promote(trade.id);
        self.store
            .commit(Changeset::new().signal(signal.clone()).trade(trade.clone()))
            .await?;
        drop(guard);

        tracing::info!(
            trade_id = %trade.id,
            user_id = %config.user_id,
            quantity = %trade.quantity,
            leverage = trade.leverage,
            risk_amount = %trade.risk_amount,
            "Trade admitted."
        );
        self.bus
            .publish(NotificationEvent::SignalEmitted(SignalEmitted::new(&signal, &sizing)), &config.notifications);
        Ok(trade)
    }

    /// Refuses setups whose all-time record has fallen below the quality bar.
    async fn check_setup_quality(&self, user_id: UserId, signal: &Signal) -> Result<()> {
        let key = StatisticsKey::containing(user_id, PeriodType::AllTime, signal.created_at);
        let Some(stats) = self.store.statistics(&key).await? else {
            return Ok(());
        };
        let Some(record) = stats.by_setup.get(&signal.setup_type) else {
            return Ok(());
        };
        let win_rate = record.win_rate();
        if self.quality.admits(record.trades, win_rate) {
            return Ok(());
        }
        Err(Error::SetupUnderperforming {
            setup: signal.setup_type,
            trades: record.trades,
            win_rate: win_rate.unwrap_or_default(),
            minimum: self.quality.min_win_rate,
        })
    }

    async fn reject(&self, config: &UserConfig, mut signal: Signal, error: Error) -> Error {
        tracing::warn!(user_id = %config.user_id, symbol = %signal.symbol, code = error.code(), error = %error, "Signal rejected.");
        signal.reject(error.code(), error.to_string());
        let (id, symbol) = (signal.id, signal.symbol.clone());
        if let Err(e) = self.store.commit(Changeset::new().signal(signal)).await {
            tracing::error!(signal_id = %id, error = %e, "Failed to record rejected signal.");
        }
        self.publish_rejection(config, Some(id), &symbol, &error);
        error
    }

    /// Sends the entry order, then re-checks the guard before recording it.
    async fn place_entry(&self, config: &UserConfig, trade: Trade, now: DateTime<Utc>) -> Result<Trade> {
        let request = OrderRequest {
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            side: trade.side,
            order_type: OrderType::Limit,
            price: Some(trade.entry_price),
            quantity: trade.quantity,
            leverage: trade.leverage,
        };

        let order_id = match with_retry(&self.retry, "place_order", || self.exchange.place_order(&request)).await {
            Ok(order_id) => order_id,
            Err(e) => {
                let reason = if e.is_retryable() {
                    self.cancel_unacknowledged(trade.id).await;
                    CancelReason::ExchangeTimeout
                } else {
                    CancelReason::ExchangeRejected(e.to_string())
                };
                self.cancel_trade(config, trade.id, reason, now).await?;
                return Err(e.into());
            }
        };

        // --- Optimistic re-validation ---
        let guard = self.locks.lock(config.user_id).await;
        let revalidated = self.revalidate(config, trade.id, &order_id, now).await;
        drop(guard);

        match revalidated {
            Ok(Revalidation::Accepted(trade)) => {
                tracing::info!(trade_id = %trade.id, order_id = %order_id, "Entry order placed.");
                Ok(trade)
            }
            Ok(Revalidation::Refused(trade, error)) => {
                self.cancel_order_quietly(&order_id).await;
                self.publish_cancelled(config, &trade);
                Err(error)
            }
            Err(e) => {
                self.cancel_order_quietly(&order_id).await;
                Err(e)
            }
        }
    }

    /// Must run inside the user's lock.
    async fn revalidate(
        &self,
        config: &UserConfig,
        trade_id: TradeId,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<Revalidation> {
        let mut trade = self.store.trade(trade_id).await?;
        if trade.status != TradeStatus::Pending {
            return Err(Error::InvalidTransition { trade_id, from: trade.status, to: TradeStatus::Open });
        }

        let trades = self.store.trades_for_user(config.user_id).await?;
        let state = PortfolioState::derive(&trades, config.risk.budget, now, Some(trade_id));
        if let Err(e) = self.guard.check(&state, &config.risk) {
            tracing::warn!(trade_id = %trade_id, code = e.code(), "Guard no longer holds after placement.");
            self.lifecycle
                .cancel(&mut trade, CancelReason::RiskRevalidation(e.code().to_string()), now)?;
            self.store.commit(Changeset::new().trade(trade.clone())).await?;
            return Ok(Revalidation::Refused(trade, e.into()));
        }

        trade.entry_order_id = Some(order_id.clone());
        self.store.commit(Changeset::new().trade(trade.clone())).await?;
        Ok(Revalidation::Accepted(trade))
    }

    // --- Fills, expiry and invalidation ---

    /// Asks the exchange about a PENDING trade's entry order and acts on the answer.
    ///
    /// A fill opens the trade. An unfilled order past the signal's validity is
    /// cancelled. A timeout leaves the trade PENDING and returns a retryable error.
    pub async fn poll_fill(&self, trade_id: TradeId, now: DateTime<Utc>) -> Result<Trade> {
        let trade = self.store.trade(trade_id).await?;
        if trade.status != TradeStatus::Pending {
            return Err(Error::InvalidTransition { trade_id, from: trade.status, to: TradeStatus::Open });
        }
        let config = self.user_config(trade.user_id)?;
        let signal = self.store.signal(trade.signal_id).await?;
        let expired = signal.is_expired(now);

        let Some(order_id) = trade.entry_order_id.clone() else {
            // The order never made it to the exchange.
            if expired {
                return self.cancel_trade(&config, trade_id, CancelReason::Expired, now).await;
            }
            return Ok(trade);
        };

        let status = match with_retry(&self.retry, "query_fill", || self.exchange.query_fill(&order_id)).await {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                tracing::warn!(trade_id = %trade_id, error = %e, "Fill status unknown, trade stays pending.");
                return Err(e.into());
            }
            Err(e) => FillStatus::Rejected { reason: e.to_string() },
        };

        match status {
            FillStatus::Filled { price, time, .. } => self.open_trade(&config, trade_id, price, time).await,
            FillStatus::Rejected { reason } => {
                self.cancel_trade(&config, trade_id, CancelReason::ExchangeRejected(reason), now).await
            }
            FillStatus::Pending if expired => {
                match with_retry(&self.retry, "cancel_order", || self.exchange.cancel_order(&order_id)).await {
                    Ok(()) => self.cancel_trade(&config, trade_id, CancelReason::Expired, now).await,
                    Err(e) if e.is_retryable() => Err(e.into()),
                    Err(e) => {
                        // Most likely filled in between; the next poll sees it.
                        tracing::warn!(trade_id = %trade_id, error = %e, "Exchange refused to cancel expired order.");
                        Ok(trade)
                    }
                }
            }
            FillStatus::Pending => Ok(trade),
        }
    }

    /// Polls every PENDING trade.
    pub async fn poll_pending(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let pending: Vec<TradeId> = self
            .store
            .active_trades()
            .await?
            .into_iter()
            .filter(|t| t.status == TradeStatus::Pending)
            .map(|t| t.id)
            .collect();

        let results = future::join_all(pending.iter().map(|id| self.poll_fill(*id, now))).await;
        let mut report = BatchReport::default();
        for (id, result) in pending.into_iter().zip(results) {
            match result {
                Ok(trade) => report.updated.push(trade),
                Err(e) => report.failed.push((id, e)),
            }
        }
        Ok(report)
    }

    async fn open_trade(&self, config: &UserConfig, trade_id: TradeId, price: Decimal, time: DateTime<Utc>) -> Result<Trade> {
        let guard = self.locks.lock(config.user_id).await;
        let mut trade = self.store.trade(trade_id).await?;
        let pair = self.store.pair(&trade.symbol).await?;
        self.lifecycle.fill(&mut trade, price, time, pair.taker_fee)?;
        self.store.commit(Changeset::new().trade(trade.clone())).await?;
        drop(guard);

        self.bus
            .publish(NotificationEvent::TradeOpened(TradeOpened::from_trade(&trade)), &config.notifications);
        Ok(trade)
    }

    /// Cancels a trade before it fills, e.g. because market structure changed.
    pub async fn invalidate(&self, trade_id: TradeId, reason: impl Into<String>, now: DateTime<Utc>) -> Result<Trade> {
        let trade = self.store.trade(trade_id).await?;
        if trade.status != TradeStatus::Pending {
            return Err(Error::InvalidTransition { trade_id, from: trade.status, to: TradeStatus::Cancelled });
        }
        let config = self.user_config(trade.user_id)?;
        if let Some(order_id) = &trade.entry_order_id {
            with_retry(&self.retry, "cancel_order", || self.exchange.cancel_order(order_id)).await?;
        }
        self.cancel_trade(&config, trade_id, CancelReason::Invalidated(reason.into()), now).await
    }

    async fn cancel_trade(&self, config: &UserConfig, trade_id: TradeId, reason: CancelReason, now: DateTime<Utc>) -> Result<Trade> {
        let guard = self.locks.lock(config.user_id).await;
        let mut trade = self.store.trade(trade_id).await?;
        self.lifecycle.cancel(&mut trade, reason, now)?;
        self.store.commit(Changeset::new().trade(trade.clone())).await?;
        drop(guard);

        self.publish_cancelled(config, &trade);
        Ok(trade)
    }

    /// A placement that never answered may still have reached the exchange.
    /// Cancels whatever it kept under the trade's client id.
    async fn cancel_unacknowledged(&self, trade_id: TradeId) {
        match with_retry(&self.retry, "cancel_by_client_id", || self.exchange.cancel_by_client_id(&trade_id)).await {
            Ok(0) => {}
            Ok(cancelled) => {
                tracing::warn!(trade_id = %trade_id, cancelled, "Cancelled entry orders left behind by a timed-out placement.");
            }
            Err(e) => {
                tracing::error!(trade_id = %trade_id, error = %e, "Entry order may be live on the exchange without a trade.");
            }
        }
    }

    async fn cancel_order_quietly(&self, order_id: &OrderId) {
        if let Err(e) = with_retry(&self.retry, "cancel_order", || self.exchange.cancel_order(order_id)).await {
            tracing::error!(order_id = %order_id, error = %e, "Failed to cancel orphaned entry order.");
        }
    }

    // --- Price ticks and exits ---

    /// Feeds a price to every live trade on `symbol`.
    ///
    /// Users are processed concurrently, each user's trades one after another.
    pub async fn on_price(&self, symbol: &Symbol, price: Decimal, now: DateTime<Utc>) -> Result<BatchReport> {
        let mut by_user: BTreeMap<UserId, Vec<TradeId>> = BTreeMap::new();
        for trade in self.store.active_trades().await? {
            if trade.symbol == *symbol && trade.is_live() {
                by_user.entry(trade.user_id).or_default().push(trade.id);
            }
        }
        if by_user.is_empty() {
            return Ok(BatchReport::default());
        }
        let taker_fee = self.store.pair(symbol).await?.taker_fee;

        let per_user = by_user.into_iter().map(|(user_id, trade_ids)| async move {
            let mut results = Vec::with_capacity(trade_ids.len());
            for trade_id in trade_ids {
                results.push((trade_id, self.process_tick(user_id, trade_id, price, now, taker_fee).await));
            }
            results
        });

        let mut report = BatchReport::default();
        for (trade_id, result) in future::join_all(per_user).await.into_iter().flatten() {
            match result {
                Ok(Some(trade)) => report.updated.push(trade),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(trade_id = %trade_id, error = %e, "Failed to apply price tick.");
                    report.failed.push((trade_id, e));
                }
            }
        }
        Ok(report)
    }

    async fn process_tick(
        &self,
        user_id: UserId,
        trade_id: TradeId,
        price: Decimal,
        now: DateTime<Utc>,
        taker_fee: Decimal,
    ) -> Result<Option<Trade>> {
        let config = self.user_config(user_id)?;
        let guard = self.locks.lock(user_id).await;

        let mut trade = self.store.trade(trade_id).await?;
        let events = self.lifecycle.on_price(&mut trade, price, now, taker_fee)?;
        if events.is_empty() {
            return Ok(None);
        }
        self.commit_transition(&trade).await?;
        drop(guard);

        self.publish_lifecycle(&config, &trade, events);
        Ok(Some(trade))
    }

    /// Closes what is left of a live trade at `price`.
    pub async fn close_manually(&self, trade_id: TradeId, price: Decimal, now: DateTime<Utc>) -> Result<Trade> {
        let user_id = self.store.trade(trade_id).await?.user_id;
        let config = self.user_config(user_id)?;
        let guard = self.locks.lock(user_id).await;

        let mut trade = self.store.trade(trade_id).await?;
        let taker_fee = self.store.pair(&trade.symbol).await?.taker_fee;
        let event = self.lifecycle.close(&mut trade, price, now, ExitReason::Manual, taker_fee)?;
        self.commit_transition(&trade).await?;
        drop(guard);

        self.publish_lifecycle(&config, &trade, vec![event]);
        Ok(trade)
    }

    /// Commits a changed trade. A close also folds the trade into the
    /// statistics buckets and its pair's figures, in the same changeset.
    async fn commit_transition(&self, trade: &Trade) -> Result<()> {
        let Some(outcome) = TradeOutcome::from_trade(trade) else {
            self.store.commit(Changeset::new().trade(trade.clone())).await?;
            return Ok(());
        };

        let mut changes = Changeset::new().trade(trade.clone());
        for key in StatisticsKey::all_containing(trade.user_id, outcome.closed_at) {
            if self.store.statistics_applied(&key, trade.id).await? {
                tracing::debug!(trade_id = %trade.id, period = %key.period_type, "Trade already counted in bucket, skipping.");
                continue;
            }
            let mut stats = self.store.statistics(&key).await?.unwrap_or_else(|| Statistics::empty(key));
            self.aggregator.apply(&mut stats, &outcome);
            changes = changes.statistics([stats]).applied(key, trade.id);
        }
        if changes.applied.is_empty() {
            // Redelivered close: the pair's figures were counted with the buckets.
            self.store.commit(changes).await?;
            return Ok(());
        }

        let _pair_guard = self.pair_stats.lock().await;
        let mut pair = self.store.pair(&trade.symbol).await?;
        pair.stats.record(outcome.pnl, outcome.realized_rr);

        self.store.commit(changes.pair(pair)).await?;
        Ok(())
    }

    // --- Statistics ---

    /// The stored bucket of `period_type` containing `at`.
    pub async fn statistics(&self, user_id: UserId, period_type: PeriodType, at: DateTime<Utc>) -> Result<Statistics> {
        let key = StatisticsKey::containing(user_id, period_type, at);
        Ok(self.store.statistics(&key).await?.unwrap_or_else(|| Statistics::empty(key)))
    }

    /// Rebuilds the bucket from the user's closed trades, ignoring what is stored.
    pub async fn recompute_statistics(&self, user_id: UserId, period_type: PeriodType, at: DateTime<Utc>) -> Result<Statistics> {
        let key = StatisticsKey::containing(user_id, period_type, at);
        let outcomes: Vec<TradeOutcome> = self
            .store
            .trades_for_user(user_id)
            .await?
            .iter()
            .filter_map(TradeOutcome::from_trade)
            .collect();
        Ok(AnalyticsEngine::new().recompute(key, &outcomes))
    }

    /// Builds and publishes the day's summary for a user.
    pub async fn daily_summary(&self, user_id: UserId, now: DateTime<Utc>) -> Result<DailySummary> {
        let config = self.user_config(user_id)?;
        let stats = self.statistics(user_id, PeriodType::Daily, now).await?;
        let all_time = self.statistics(user_id, PeriodType::AllTime, now).await?;
        let budget = config.risk.budget;
        let open_trades = self
            .store
            .trades_for_user(user_id)
            .await?
            .iter()
            .filter(|t| t.is_live())
            .count() as u32;

        let summary = DailySummary {
            user_id,
            date: now.date_naive(),
            total_trades: stats.total_trades,
            winning_trades: stats.winning_trades,
            losing_trades: stats.losing_trades,
            total_pnl: stats.total_pnl,
            win_rate: stats.win_rate,
            pnl_percent: stats.total_pnl.checked_div(budget).unwrap_or_default() * Decimal::ONE_HUNDRED,
            best_trade: stats.max_win,
            worst_trade: stats.max_loss,
            average_rr: stats.average_rr,
            balance: budget + all_time.total_pnl,
            open_trades,
        };
        self.bus.publish(NotificationEvent::DailySummary(summary.clone()), &config.notifications);
        Ok(summary)
    }

    // --- Notifications ---

    fn publish_rejection(&self, config: &UserConfig, signal_id: Option<core_types::SignalId>, symbol: &Symbol, error: &Error) {
        let event = SignalRejected {
            user_id: config.user_id,
            signal_id,
            symbol: symbol.clone(),
            code: error.code().to_string(),
            message: error.to_string(),
        };
        self.bus.publish(NotificationEvent::SignalRejected(event), &config.notifications);
    }

    fn publish_cancelled(&self, config: &UserConfig, trade: &Trade) {
        let Some(reason) = trade.cancel_reason.clone() else { return };
        let event = TradeCancelled {
            user_id: trade.user_id,
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            reason,
        };
        self.bus.publish(NotificationEvent::TradeCancelled(event), &config.notifications);
    }

    fn publish_lifecycle(&self, config: &UserConfig, trade: &Trade, events: Vec<LifecycleEvent>) {
        for event in events {
            let notification = match event {
                LifecycleEvent::Opened => NotificationEvent::TradeOpened(TradeOpened::from_trade(trade)),
                LifecycleEvent::PartiallyClosed { target_r, fill } => {
                    NotificationEvent::TradePartiallyClosed(TradePartiallyClosed {
                        user_id: trade.user_id,
                        trade_id: trade.id,
                        symbol: trade.symbol.clone(),
                        target_r,
                        price: fill.price,
                        quantity: fill.quantity,
                        remaining_quantity: trade.remaining_quantity,
                        net_pnl: fill.net_pnl(),
                    })
                }
                LifecycleEvent::BreakevenMoved { new_stop } => NotificationEvent::BreakevenMoved(BreakevenMoved {
                    user_id: trade.user_id,
                    trade_id: trade.id,
                    symbol: trade.symbol.clone(),
                    new_stop,
                }),
                LifecycleEvent::Closed { .. } => match TradeClosed::from_trade(trade) {
                    Some(closed) => NotificationEvent::TradeClosed(closed),
                    None => continue,
                },
                LifecycleEvent::Cancelled { .. } => {
                    self.publish_cancelled(config, trade);
                    continue;
                }
            };
            self.bus.publish(notification, &config.notifications);
        }
    }
}

enum Revalidation {
    Accepted(Trade),
    Refused(Trade, Error),
}
