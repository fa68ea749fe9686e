// --- Notification Events ---
//
// Everything the engine tells the outside world goes through here. The bot
// layer subscribes to the bus and renders messages; this crate only carries
// the facts.

use chrono::{DateTime, NaiveDate, Utc};
use core_types::{
    CancelReason, ConfluenceFactor, ExitReason, SetupType, Side, Signal, SignalId, Sizing, Symbol,
    TimeFrame, Trade, TradeId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An admitted signal together with the position it was sized to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEmitted {
    pub user_id: UserId,
    pub signal_id: SignalId,
    pub trade_id: Option<TradeId>,
    pub symbol: Symbol,
    pub timeframe: TimeFrame,
    pub setup_type: SetupType,
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub rr_ratio: Decimal,
    /// Stop distance in percent of entry.
    pub stop_percent: Decimal,
    pub confluence_factors: Vec<ConfluenceFactor>,
    pub valid_until: DateTime<Utc>,
    pub risk_amount: Decimal,
    pub risk_percent: Decimal,
    pub position_size: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub margin: Decimal,
}

impl SignalEmitted {
    pub fn new(signal: &Signal, sizing: &Sizing) -> Self {
        Self {
            user_id: signal.user_id,
            signal_id: signal.id,
            trade_id: signal.trade_id,
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            setup_type: signal.setup_type,
            side: signal.side,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            rr_ratio: signal.rr_ratio(),
            stop_percent: signal.stop_fraction() * Decimal::ONE_HUNDRED,
            confluence_factors: signal.confluence_factors.clone(),
            valid_until: signal.valid_until,
            risk_amount: sizing.risk_amount,
            risk_percent: sizing.risk_percent,
            position_size: sizing.position_size,
            quantity: sizing.quantity,
            leverage: sizing.leverage,
            margin: sizing.margin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOpened {
    pub user_id: UserId,
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub side: Side,
    pub setup_type: SetupType,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub risk_amount: Decimal,
}

impl TradeOpened {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            user_id: trade.user_id,
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            side: trade.side,
            setup_type: trade.setup_type,
            entry_price: trade.entry_price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            quantity: trade.quantity,
            leverage: trade.leverage,
            risk_amount: trade.risk_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePartiallyClosed {
    pub user_id: UserId,
    pub trade_id: TradeId,
    pub symbol: Symbol,
    /// The R level of the target that was hit.
    pub target_r: Decimal,
    pub price: Decimal,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub net_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakevenMoved {
    pub user_id: UserId,
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub new_stop: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeClosed {
    pub user_id: UserId,
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub side: Side,
    pub exit_price: Decimal,
    pub exit_reason: ExitReason,
    pub pnl_amount: Decimal,
    pub pnl_percent: Decimal,
    pub realized_rr: Decimal,
    pub duration_secs: i64,
}

impl TradeClosed {
    /// Builds the event from a CLOSED trade. Returns `None` for anything else.
    pub fn from_trade(trade: &Trade) -> Option<Self> {
        Some(Self {
            user_id: trade.user_id,
            trade_id: trade.id,
            symbol: trade.symbol.clone(),
            side: trade.side,
            exit_price: trade.exit_price?,
            exit_reason: trade.exit_reason?,
            pnl_amount: trade.pnl_amount?,
            pnl_percent: trade.pnl_percent?,
            realized_rr: trade.realized_rr?,
            duration_secs: trade.duration_secs?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCancelled {
    pub user_id: UserId,
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRejected {
    pub user_id: UserId,
    pub signal_id: Option<SignalId>,
    pub symbol: Symbol,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_pnl: Decimal,
    pub win_rate: Option<f64>,
    /// The day's pnl in percent of the user's budget.
    pub pnl_percent: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
    pub average_rr: Option<Decimal>,
    /// Budget plus all-time net pnl.
    pub balance: Decimal,
    pub open_trades: u32,
}

/// The top-level notification enum.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationEvent {
    SignalEmitted(SignalEmitted),
    SignalRejected(SignalRejected),
    TradeOpened(TradeOpened),
    TradePartiallyClosed(TradePartiallyClosed),
    BreakevenMoved(BreakevenMoved),
    TradeClosed(TradeClosed),
    TradeCancelled(TradeCancelled),
    DailySummary(DailySummary),
}

impl NotificationEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            NotificationEvent::SignalEmitted(e) => e.user_id,
            NotificationEvent::SignalRejected(e) => e.user_id,
            NotificationEvent::TradeOpened(e) => e.user_id,
            NotificationEvent::TradePartiallyClosed(e) => e.user_id,
            NotificationEvent::BreakevenMoved(e) => e.user_id,
            NotificationEvent::TradeClosed(e) => e.user_id,
            NotificationEvent::TradeCancelled(e) => e.user_id,
            NotificationEvent::DailySummary(e) => e.user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::SignalEmitted(_) => "signal_emitted",
            NotificationEvent::SignalRejected(_) => "signal_rejected",
            NotificationEvent::TradeOpened(_) => "trade_opened",
            NotificationEvent::TradePartiallyClosed(_) => "trade_partially_closed",
            NotificationEvent::BreakevenMoved(_) => "breakeven_moved",
            NotificationEvent::TradeClosed(_) => "trade_closed",
            NotificationEvent::TradeCancelled(_) => "trade_cancelled",
            NotificationEvent::DailySummary(_) => "daily_summary",
        }
    }
}

/// Which notifications a user wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    #[serde(default = "enabled")]
    pub trade_opened: bool,
    #[serde(default = "enabled")]
    pub trade_closed: bool,
    #[serde(default = "enabled")]
    pub daily_summary: bool,
}

fn enabled() -> bool { true }

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self { trade_opened: true, trade_closed: true, daily_summary: true }
    }
}

impl NotificationPrefs {
    pub fn allows(&self, event: &NotificationEvent) -> bool {
        match event {
            NotificationEvent::TradeOpened(_) => self.trade_opened,
            NotificationEvent::TradePartiallyClosed(_)
            | NotificationEvent::BreakevenMoved(_)
            | NotificationEvent::TradeClosed(_) => self.trade_closed,
            NotificationEvent::DailySummary(_) => self.daily_summary,
            _ => true,
        }
    }
}

/// A cloneable handle to the broadcast channel the engine publishes on.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    /// Publishes `event` if `prefs` allow it. Having no subscribers is not an error.
    pub fn publish(&self, event: NotificationEvent, prefs: &NotificationPrefs) {
        if !prefs.allows(&event) {
            tracing::trace!(kind = event.kind(), user_id = event.user_id().0, "Notification muted by user.");
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::trace!("No notification subscribers.");
        }
    }
}
