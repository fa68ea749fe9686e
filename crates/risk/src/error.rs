// In crates/risk/src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

/// Sizing and admission rejections. Each variant is a distinct, expected
/// outcome that is reported to the user unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Position notional {notional} is below the pair minimum of {minimum}")]
    InsufficientBudget { notional: Decimal, minimum: Decimal },

    #[error("Position needs {required}x leverage but the cap is {cap}x")]
    LeverageExceeded { required: u32, cap: u32 },

    #[error("{active} trades already active (max {max})")]
    ConcurrentTradeLimitExceeded { active: u32, max: u32 },

    #[error("{today} trades already opened today (max {max})")]
    DailyTradeLimitExceeded { today: u32, max: u32 },

    #[error("Realized pnl today {pnl} is at or below the daily loss limit of -{limit}")]
    DailyLossLimitExceeded { pnl: Decimal, limit: Decimal },

    #[error("Weekly drawdown {drawdown_percent}% reached the limit of {limit_percent}%")]
    WeeklyDrawdownExceeded { drawdown_percent: Decimal, limit_percent: Decimal },

    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InsufficientBudget { .. } => "insufficient_budget",
            Error::LeverageExceeded { .. } => "leverage_exceeded",
            Error::ConcurrentTradeLimitExceeded { .. } => "concurrent_trade_limit_exceeded",
            Error::DailyTradeLimitExceeded { .. } => "daily_trade_limit_exceeded",
            Error::DailyLossLimitExceeded { .. } => "daily_loss_limit_exceeded",
            Error::WeeklyDrawdownExceeded { .. } => "weekly_drawdown_exceeded",
            Error::InvalidParameters(_) => "invalid_risk_parameters",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
