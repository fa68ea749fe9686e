// In crates/engine/src/error.rs

use core_types::{SetupType, Symbol, TradeId, TradeStatus, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Confluence(#[from] confluence::Error),

    #[error(transparent)]
    Risk(#[from] risk::Error),

    #[error(transparent)]
    Exchange(#[from] execution::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] database::Error),

    #[error("Trade {trade_id} cannot move from {from} to {to}")]
    InvalidTransition { trade_id: TradeId, from: TradeStatus, to: TradeStatus },

    #[error("Trading pair {0} is unknown")]
    UnknownPair(Symbol),

    #[error("Trading pair {0} is disabled")]
    PairDisabled(Symbol),

    #[error("{setup} wins {win_rate:.1}% of {trades} trades, below the {minimum}% bar")]
    SetupUnderperforming { setup: SetupType, trades: u32, win_rate: f64, minimum: f64 },

    #[error("Trading is disabled for user {0}")]
    TradingDisabled(UserId),

    #[error("User {0} has no configuration")]
    UnknownUser(UserId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// A stable, machine-readable name for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Confluence(e) => e.code(),
            Error::Risk(e) => e.code(),
            Error::Exchange(e) => e.code(),
            Error::Persistence(_) => "persistence_error",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::UnknownPair(_) => "unknown_pair",
            Error::PairDisabled(_) => "pair_disabled",
            Error::SetupUnderperforming { .. } => "setup_underperforming",
            Error::TradingDisabled(_) => "trading_disabled",
            Error::UnknownUser(_) => "unknown_user",
            Error::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Expected outcomes of evaluation and admission, as opposed to faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Confluence(_)
                | Error::Risk(_)
                | Error::PairDisabled(_)
                | Error::SetupUnderperforming { .. }
                | Error::TradingDisabled(_)
        )
    }

    /// Whether calling again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Exchange(e) => e.is_retryable(),
            Error::Persistence(database::Error::NotFound { .. } | database::Error::AlreadyApplied { .. }) => false,
            Error::Persistence(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let rejection = Error::from(risk::Error::ConcurrentTradeLimitExceeded { active: 3, max: 3 });
        assert!(rejection.is_rejection());
        assert!(!rejection.is_retryable());
        assert_eq!(rejection.code(), "concurrent_trade_limit_exceeded");

        let timeout = Error::from(execution::Error::ExchangeTimeout { operation: "query_fill", attempts: 4 });
        assert!(timeout.is_retryable());
        assert!(!timeout.is_rejection());

        let weak = Error::SetupUnderperforming {
            setup: SetupType::PocBounce,
            trades: 25,
            win_rate: 40.0,
            minimum: 55.0,
        };
        assert!(weak.is_rejection());
        assert_eq!(weak.code(), "setup_underperforming");

        let store = Error::from(database::Error::Persistence("disk full".into()));
        assert!(store.is_retryable());
        assert_eq!(store.code(), "persistence_error");
    }
}
