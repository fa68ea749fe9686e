// In crates/execution/src/lib.rs

use async_trait::async_trait;
use core_types::{OrderId, TradeId};
pub mod error;
pub mod retry;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use retry::with_retry;
pub use simulated::{Fault, SimulatedExchange};
pub use types::{FillStatus, OrderRequest, OrderType, RetryPolicy, SimulationSettings};

/// The boundary to a venue that accepts orders.
///
/// Implementations do a single attempt per call. Deadlines and retries are
/// layered on top with [`with_retry`], so a client never has to sleep or loop.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// The name of the client (e.g., "SimulatedExchange").
    fn name(&self) -> &'static str;

    /// Submits an order and returns the venue's id for it.
    ///
    /// # Returns
    ///
    /// * `Err(Error::ExchangeRejected)`: the venue refused the order.
    /// * `Err(Error::Transient)`: nothing is known about the order; retrying is safe.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId>;

    /// Reports whether a previously placed order has been filled.
    async fn query_fill(&self, order_id: &OrderId) -> Result<FillStatus>;

    /// Cancels an unfilled order.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<()>;

    /// Cancels every unfilled order placed for `trade_id`, the client id sent
    /// with each [`OrderRequest`]. Used when placement never acknowledged an
    /// order id. Returns how many orders were cancelled; zero is not an error.
    ///
    /// # Returns
    ///
    /// * `Err(Error::ExchangeRejected)`: an order for the trade has already filled.
    async fn cancel_by_client_id(&self, trade_id: &TradeId) -> Result<usize>;
}
