// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};
use core_types::TradingPair;
use std::path::Path;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{
    AppSettings, DatabaseSettings, EngineSettings, LifecycleSettings, PartialTarget, QualitySettings,
    Settings, UserConfig,
};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
///
/// The result is validated before it is returned.
pub fn load_settings() -> Result<Settings> {
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name("config/base"))
        .add_source(File::with_name(&format!("config/{}", environment)).required(false))
        // e.g. `APP_DATABASE__URL=...`
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}

/// Loads per-user trading preferences from a TOML file of `[[users]]` tables.
pub fn load_users(path: impl AsRef<Path>) -> Result<Vec<UserConfig>> {
    let content = std::fs::read_to_string(path)?;
    let file: types::UsersFile = toml::from_str(&content)?;
    for user in &file.users {
        user.validate()?;
    }
    Ok(file.users)
}

/// Loads the trading pair seed data from a TOML file of `[[pairs]]` tables.
pub fn load_pairs(path: impl AsRef<Path>) -> Result<Vec<TradingPair>> {
    let content = std::fs::read_to_string(path)?;
    let file: types::PairsFile = toml::from_str(&content)?;
    Ok(file.pairs)
}
