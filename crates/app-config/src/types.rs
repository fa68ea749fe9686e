// In crates/app-config/src/types.rs

use confluence::ConfluenceTables;
use core_types::{SetupType, Symbol, TradingPair, UserId};
use events::NotificationPrefs;
use execution::{RetryPolicy, SimulationSettings};
use risk::{LeverageTable, RiskProfile};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{Error, Result};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the database connection. Without it the engine keeps
    /// everything in memory.
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub confluence: ConfluenceTables,
    #[serde(default)]
    pub leverage: LeverageTable,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub quality: QualitySettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    /// The connection URL for the PostgreSQL database.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Deserialize, Debug, Clone)]
pub struct EngineSettings {
    /// Deadline and backoff for every exchange call.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Buffer size of the notification broadcast channel.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_notification_capacity() -> usize { 256 }

impl Default for EngineSettings {
    fn default() -> Self {
        Self { retry: RetryPolicy::default(), notification_capacity: default_notification_capacity() }
    }
}

/// Setups whose track record falls below these figures stop being traded.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct QualitySettings {
    /// Minimum all-time win rate of a setup, in percent.
    #[serde(default = "default_min_win_rate")]
    pub min_win_rate: f64,
    /// Closed trades a setup needs before its win rate is judged.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u32,
}

fn default_min_win_rate() -> f64 { 55.0 }
fn default_min_sample_size() -> u32 { 20 }

impl Default for QualitySettings {
    fn default() -> Self {
        Self { min_win_rate: default_min_win_rate(), min_sample_size: default_min_sample_size() }
    }
}

impl QualitySettings {
    /// Whether a setup with `trades` closed trades and `win_rate` percent wins may still be traded.
    pub fn admits(&self, trades: u32, win_rate: Option<f64>) -> bool {
        match win_rate {
            Some(rate) if trades >= self.min_sample_size => rate >= self.min_win_rate,
            _ => true,
        }
    }
}

/// One scale-out level: close `close_percent` of the original quantity once
/// price has moved `r_multiple` times the initial risk.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PartialTarget {
    pub r_multiple: Decimal,
    pub close_percent: Decimal,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    #[serde(default = "default_partial_targets")]
    pub partial_targets: Vec<PartialTarget>,
    /// R multiple at which the stop moves to entry.
    #[serde(default = "default_breakeven_r")]
    pub breakeven_r: Decimal,
}

fn default_partial_targets() -> Vec<PartialTarget> {
    vec![
        PartialTarget { r_multiple: Decimal::ONE, close_percent: Decimal::from(50) },
        PartialTarget { r_multiple: Decimal::TWO, close_percent: Decimal::from(30) },
    ]
}

fn default_breakeven_r() -> Decimal { Decimal::new(15, 1) }

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { partial_targets: default_partial_targets(), breakeven_r: default_breakeven_r() }
    }
}

impl LifecycleSettings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let total: Decimal = self.partial_targets.iter().map(|t| t.close_percent).sum();
        if total > Decimal::ONE_HUNDRED {
            return Err(format!("partial close percentages add up to {total}%, more than 100%"));
        }
        let mut previous = Decimal::ZERO;
        for target in &self.partial_targets {
            if target.close_percent <= Decimal::ZERO {
                return Err("partial close percentages must be positive".into());
            }
            if target.r_multiple <= previous {
                return Err("partial targets must be positive and strictly ascending".into());
            }
            previous = target.r_multiple;
        }
        if self.breakeven_r <= Decimal::ZERO {
            return Err("breakeven_r must be positive".into());
        }
        Ok(())
    }
}

impl Settings {
    /// Rejects settings that would make the engine misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        self.confluence.validate().map_err(Error::Invalid)?;
        self.lifecycle.validate().map_err(Error::Invalid)?;
        let leverage = &self.leverage;
        if [leverage.low_volatility, leverage.medium_volatility, leverage.high_volatility, leverage.extreme_volatility]
            .contains(&0)
        {
            return Err(Error::Invalid("leverage multipliers must be at least 1".into()));
        }
        if !(0.0..=100.0).contains(&self.quality.min_win_rate) {
            return Err(Error::Invalid("quality.min_win_rate must be between 0 and 100".into()));
        }
        if self.engine.retry.max_attempts == 0 {
            return Err(Error::Invalid("engine.retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

// --- Per-user and pair seed files ---

/// A user's trading preferences. The engine takes a snapshot of it on every call.
#[derive(Deserialize, Debug, Clone)]
pub struct UserConfig {
    pub user_id: UserId,
    #[serde(default = "default_enabled")]
    pub trading_enabled: bool,
    pub risk: RiskProfile,
    #[serde(default = "all_setups")]
    pub enabled_setups: Vec<SetupType>,
    /// Setups with a lower reward ratio are not traded.
    #[serde(default = "default_min_rr_ratio")]
    pub min_rr_ratio: Decimal,
    /// Floor on confluence factors, on top of each setup's own minimum.
    #[serde(default = "default_min_confluence")]
    pub min_confluence: usize,
    /// Pairs the user trades. Empty means every active pair.
    #[serde(default)]
    pub enabled_pairs: Vec<Symbol>,
    #[serde(default)]
    pub notifications: NotificationPrefs,
}

fn default_enabled() -> bool { true }
fn default_min_rr_ratio() -> Decimal { Decimal::new(30, 1) }
fn default_min_confluence() -> usize { 3 }
fn all_setups() -> Vec<SetupType> { SetupType::ALL.to_vec() }

impl UserConfig {
    pub fn new(user_id: UserId, risk: RiskProfile) -> Self {
        Self {
            user_id,
            trading_enabled: true,
            risk,
            enabled_setups: all_setups(),
            min_rr_ratio: default_min_rr_ratio(),
            min_confluence: default_min_confluence(),
            enabled_pairs: Vec::new(),
            notifications: NotificationPrefs::default(),
        }
    }

    pub fn trades_pair(&self, symbol: &Symbol) -> bool {
        self.enabled_pairs.is_empty() || self.enabled_pairs.contains(symbol)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_rr_ratio < Decimal::ZERO {
            return Err(Error::Invalid(format!("user {}: min_rr_ratio must not be negative", self.user_id)));
        }
        self.risk
            .validate()
            .map_err(|why| Error::Invalid(format!("user {}: {why}", self.user_id)))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct UsersFile {
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct PairsFile {
    #[serde(default)]
    pub pairs: Vec<TradingPair>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_lifecycle_is_valid() {
        assert!(LifecycleSettings::default().validate().is_ok());
    }

    #[test]
    fn partials_over_one_hundred_percent_are_rejected() {
        let settings = LifecycleSettings {
            partial_targets: vec![
                PartialTarget { r_multiple: dec!(1), close_percent: dec!(70) },
                PartialTarget { r_multiple: dec!(2), close_percent: dec!(40) },
            ],
            breakeven_r: dec!(1.5),
        };
        assert!(settings.validate().unwrap_err().contains("110"));
    }

    #[test]
    fn descending_targets_are_rejected() {
        let settings = LifecycleSettings {
            partial_targets: vec![
                PartialTarget { r_multiple: dec!(2), close_percent: dec!(30) },
                PartialTarget { r_multiple: dec!(1), close_percent: dec!(50) },
            ],
            breakeven_r: dec!(1.5),
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn user_config_parses_with_defaults() {
        let user: UserConfig = toml::from_str(
            r#"
            user_id = 42
            enabled_pairs = ["BTCUSDT"]

            [risk]
            budget = 1000
            "#,
        )
        .unwrap();
        assert!(user.trading_enabled);
        assert_eq!(user.enabled_setups, SetupType::ALL.to_vec());
        assert_eq!(user.risk.max_concurrent_trades, 3);
        assert!(user.trades_pair(&Symbol::from("BTCUSDT")));
        assert!(!user.trades_pair(&Symbol::from("ETHUSDT")));
        assert!(user.notifications.daily_summary);
        assert_eq!(user.min_rr_ratio, dec!(3));
        assert_eq!(user.min_confluence, 3);
    }

    #[test]
    fn quality_filter_needs_a_full_sample() {
        let quality = QualitySettings::default();
        assert!(quality.admits(0, None));
        assert!(quality.admits(19, Some(10.0)));
        assert!(!quality.admits(20, Some(54.9)));
        assert!(quality.admits(20, Some(55.0)));
        assert!(quality.admits(200, Some(80.0)));
    }
}
