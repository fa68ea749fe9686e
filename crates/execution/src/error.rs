// In crates/execution/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The exchange definitively refused the request. Retrying will not help.
    #[error("Exchange rejected {operation}: {reason}")]
    ExchangeRejected { operation: &'static str, reason: String },

    /// No answer within the per-attempt deadline, after all retries.
    #[error("Exchange timed out during {operation} after {attempts} attempts")]
    ExchangeTimeout { operation: &'static str, attempts: u32 },

    /// A network or server hiccup that is worth retrying.
    #[error("Transient exchange failure during {operation}: {reason}")]
    Transient { operation: &'static str, reason: String },
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ExchangeTimeout { .. } | Error::Transient { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::ExchangeRejected { .. } => "exchange_rejected",
            Error::ExchangeTimeout { .. } => "exchange_timeout",
            Error::Transient { .. } => "exchange_transient",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
