// In crates/execution/src/simulated.rs

use crate::types::{FillStatus, OrderRequest, SimulationSettings};
use crate::{Error, ExchangeClient, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{OrderId, Side, Symbol, TradeId};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted misbehaviour for the next exchange call.
#[derive(Debug, Clone)]
pub enum Fault {
    Reject(String),
    Transient(String),
    /// Sleep before answering, to trip the caller's deadline.
    Hang(Duration),
    /// Accept an order, then sleep before acknowledging it. The caller times
    /// out without learning the order id. Acts like `Hang` on other calls.
    Lost(Duration),
}

#[derive(Debug, Clone)]
struct SimOrder {
    request: OrderRequest,
    status: FillStatus,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, SimOrder>,
    marks: HashMap<Symbol, Decimal>,
    faults: VecDeque<Fault>,
    clock: Option<DateTime<Utc>>,
    next_id: u64,
}

impl State {
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }
}

/// An in-process exchange for paper trading and tests.
///
/// Limit orders fill at their price, market orders at the last mark plus
/// slippage. With `auto_fill` off, orders stay pending until
/// [`SimulatedExchange::fill`] releases them.
pub struct SimulatedExchange {
    settings: SimulationSettings,
    state: Mutex<State>,
}

impl SimulatedExchange {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings, state: Mutex::new(State::default()) }
    }

    /// Queues a fault. Faults are consumed one per call, in order.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Sets the last traded price used for market orders.
    pub fn set_mark(&self, symbol: &Symbol, price: Decimal) {
        self.lock().marks.insert(symbol.clone(), price);
    }

    /// Pins the time stamped on fills. Replays set this to the feed time.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        self.lock().clock = Some(now);
    }

    /// Fills a pending order at `price`.
    pub fn fill(&self, order_id: &OrderId, price: Decimal) -> bool {
        let mut state = self.lock();
        let time = state.now();
        match state.orders.get_mut(order_id) {
            Some(order) if order.status == FillStatus::Pending && !order.cancelled => {
                order.status = FillStatus::Filled { price, quantity: order.request.quantity, time };
                true
            }
            _ => false,
        }
    }

    /// Every order placed so far, oldest first.
    pub fn placed(&self) -> Vec<OrderRequest> {
        let state = self.lock();
        let mut orders: Vec<(&OrderId, &SimOrder)> = state.orders.iter().collect();
        orders.sort_by_key(|(id, _)| order_sequence(id));
        orders.into_iter().map(|(_, order)| order.request.clone()).collect()
    }

    pub fn is_cancelled(&self, order_id: &OrderId) -> bool {
        self.lock().orders.get(order_id).is_some_and(|o| o.cancelled)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies the next scripted fault, if any.
    async fn take_fault(&self, operation: &'static str) -> Result<()> {
        let fault = self.lock().faults.pop_front();
        apply_fault(fault, operation).await
    }

    fn accept(&self, request: &OrderRequest) -> Result<OrderId> {
        let mut state = self.lock();
        let mark = state.marks.get(&request.symbol).copied();
        let Some(price) = self.execution_price(request, mark) else {
            return Err(Error::ExchangeRejected {
                operation: "place_order",
                reason: format!("no reference price for {}", request.symbol),
            });
        };
        if request.quantity <= Decimal::ZERO {
            return Err(Error::ExchangeRejected {
                operation: "place_order",
                reason: "quantity must be positive".to_string(),
            });
        }

        state.next_id += 1;
        let order_id = OrderId(format!("SIM-{}", state.next_id));
        let status = if self.settings.auto_fill {
            FillStatus::Filled { price, quantity: request.quantity, time: state.now() }
        } else {
            FillStatus::Pending
        };
        state.orders.insert(
            order_id.clone(),
            SimOrder { request: request.clone(), status, cancelled: false },
        );

        tracing::debug!(order_id = %order_id.0, symbol = %request.symbol, side = ?request.side, %price, "Simulated order accepted.");
        Ok(order_id)
    }

    fn execution_price(&self, request: &OrderRequest, mark: Option<Decimal>) -> Option<Decimal> {
        if let Some(price) = request.price {
            return Some(price);
        }
        let slippage = self.settings.slippage_percent / Decimal::ONE_HUNDRED;
        // Slippage always works against the order.
        mark.map(|mark| match request.side {
            Side::Long => mark * (Decimal::ONE + slippage),
            Side::Short => mark * (Decimal::ONE - slippage),
        })
    }
}

async fn apply_fault(fault: Option<Fault>, operation: &'static str) -> Result<()> {
    match fault {
        None => Ok(()),
        Some(Fault::Reject(reason)) => Err(Error::ExchangeRejected { operation, reason }),
        Some(Fault::Transient(reason)) => Err(Error::Transient { operation, reason }),
        Some(Fault::Hang(duration) | Fault::Lost(duration)) => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

fn order_sequence(id: &OrderId) -> u64 {
    id.0.trim_start_matches("SIM-").parse().unwrap_or(u64::MAX)
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn name(&self) -> &'static str {
        "SimulatedExchange"
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId> {
        let fault = self.lock().faults.pop_front();
        if let Some(Fault::Lost(delay)) = fault {
            let order_id = self.accept(request)?;
            tokio::time::sleep(delay).await;
            return Ok(order_id);
        }
        apply_fault(fault, "place_order").await?;
        self.accept(request)
    }

    async fn query_fill(&self, order_id: &OrderId) -> Result<FillStatus> {
        self.take_fault("query_fill").await?;
        let state = self.lock();
        let order = state.orders.get(order_id).ok_or_else(|| Error::ExchangeRejected {
            operation: "query_fill",
            reason: format!("unknown order {}", order_id.0),
        })?;
        if order.cancelled {
            return Ok(FillStatus::Rejected { reason: "cancelled".to_string() });
        }
        Ok(order.status.clone())
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<()> {
        self.take_fault("cancel_order").await?;
        let mut state = self.lock();
        let order = state.orders.get_mut(order_id).ok_or_else(|| Error::ExchangeRejected {
            operation: "cancel_order",
            reason: format!("unknown order {}", order_id.0),
        })?;
        if matches!(order.status, FillStatus::Filled { .. }) {
            return Err(Error::ExchangeRejected {
                operation: "cancel_order",
                reason: "order already filled".to_string(),
            });
        }
        order.cancelled = true;
        Ok(())
    }

    async fn cancel_by_client_id(&self, trade_id: &TradeId) -> Result<usize> {
        self.take_fault("cancel_by_client_id").await?;
        let mut state = self.lock();
        let mut cancelled = 0;
        for order in state.orders.values_mut().filter(|o| o.request.trade_id == *trade_id) {
            if matches!(order.status, FillStatus::Filled { .. }) {
                return Err(Error::ExchangeRejected {
                    operation: "cancel_by_client_id",
                    reason: format!("an order for trade {trade_id} already filled"),
                });
            }
            if !order.cancelled {
                order.cancelled = true;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}
