// In crates/execution/src/types.rs

use chrono::{DateTime, Utc};
use core_types::{Side, Symbol, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// An order as handed to the exchange client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// The trade this order belongs to. Doubles as the client order id.
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit or trigger price. `None` for market orders.
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub leverage: u32,
}

/// What the exchange reports for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FillStatus {
    Pending,
    Filled {
        price: Decimal,
        quantity: Decimal,
        time: DateTime<Utc>,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// The simulated slippage percentage for market orders (e.g., 0.05 for 0.05%).
    #[serde(default)]
    pub slippage_percent: Decimal,

    /// Fill orders as soon as they are queried. When off, fills have to be
    /// released explicitly.
    #[serde(default = "default_auto_fill")]
    pub auto_fill: bool,
}

fn default_auto_fill() -> bool { true }

impl Default for SimulationSettings {
    fn default() -> Self {
        Self { slippage_percent: Decimal::ZERO, auto_fill: true }
    }
}

/// Bounded exponential backoff with a deadline on every attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_max_attempts() -> u32 { 4 }
fn default_base_delay_ms() -> u64 { 250 }
fn default_max_delay_ms() -> u64 { 5_000 }
fn default_attempt_timeout_ms() -> u64 { 10_000 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay before attempt `attempt + 1`, doubling from the base and capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}
