// In crates/risk/src/lib.rs

//! Position sizing and account-level admission control.
//!
//! Both pieces are pure: [`RiskSizer`] maps a signal to a position and
//! [`PortfolioRiskGuard`] decides whether the portfolio may take another
//! trade. Neither mutates anything.

pub mod error;
pub mod guard;
pub mod portfolio;
pub mod sizer;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use guard::PortfolioRiskGuard;
pub use portfolio::{PortfolioState, day_start};
pub use sizer::RiskSizer;
pub use types::{LeverageTable, RiskProfile};
