// In crates/confluence/src/error.rs

use core_types::{AssetClass, SetupType};
use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons a snapshot does not qualify as a signal. These are expected
/// outcomes and are surfaced to the notification layer as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("No enabled setup matches the reported factors")]
    NoSetup,

    #[error("Insufficient confluence for {setup}: {found} factors, {required} required")]
    InsufficientConfluence {
        setup: SetupType,
        found: usize,
        required: usize,
    },

    #[error("{setup} targets {rr_ratio}R, below the required {minimum}R")]
    RrBelowMinimum {
        setup: SetupType,
        rr_ratio: Decimal,
        minimum: Decimal,
    },

    #[error("Stop distance {stop_percent}% is outside the {min}%-{max}% band for {asset_class:?}")]
    StopOutOfBand {
        stop_percent: Decimal,
        min: Decimal,
        max: Decimal,
        asset_class: AssetClass,
    },

    #[error("Invalid price levels: {0}")]
    InvalidLevels(String),
}

impl Error {
    /// Stable machine-readable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoSetup => "no_setup",
            Error::InsufficientConfluence { .. } => "insufficient_confluence",
            Error::RrBelowMinimum { .. } => "rr_below_minimum",
            Error::StopOutOfBand { .. } => "stop_out_of_band",
            Error::InvalidLevels(_) => "invalid_levels",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
