// In app/src/main.rs

use anyhow::Result;
use analytics::{AnalyticsEngine, StatisticsKey, TradeOutcome};
use app_config::{Settings, UserConfig};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use core_types::{PeriodType, TradingPair, UserId};
use database::{Changeset, InMemoryStore, Store};
use engine::Engine;
use events::NotificationBus;
use execution::SimulatedExchange;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::prelude::*;

mod replay;
mod report;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "Signal scoring, risk admission and trade lifecycle engine for crypto futures.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replays a JSON feed of snapshots, ticks and polls against the simulated exchange.
    Run {
        /// The feed to replay.
        #[arg(short, long)]
        feed: PathBuf,

        #[arg(long, default_value = "config/users.toml")]
        users: PathBuf,

        #[arg(long, default_value = "config/pairs.toml")]
        pairs: PathBuf,
    },

    /// Loads and validates every configuration file, then exits.
    CheckConfig {
        #[arg(long, default_value = "config/users.toml")]
        users: PathBuf,

        #[arg(long, default_value = "config/pairs.toml")]
        pairs: PathBuf,
    },

    /// Prints a user's statistics from the database.
    Stats {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long, value_enum, default_value_t = PeriodArg::AllTime)]
        period: PeriodArg,

        /// Rebuild the bucket from closed trades instead of reading it.
        #[arg(long)]
        recompute: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PeriodArg {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl From<PeriodArg> for PeriodType {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Daily => PeriodType::Daily,
            PeriodArg::Weekly => PeriodType::Weekly,
            PeriodArg::Monthly => PeriodType::Monthly,
            PeriodArg::AllTime => PeriodType::AllTime,
        }
    }
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // Settings errors are reported again, with logging in place, by the command itself.
    let level = app_config::load_settings()
        .ok()
        .and_then(|settings| settings.app.log_level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("sqlx::query", tracing::Level::WARN) // Disable sqlx query debug logs
            .with_default(level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();

    let cli = Cli::parse();

    tracing::info!("Starting application");

    match cli.command {
        Commands::Run { feed, users, pairs } => {
            handle_run(feed, users, pairs).await?;
        }
        Commands::CheckConfig { users, pairs } => {
            handle_check_config(users, pairs)?;
        }
        Commands::Stats { user, period, recompute } => {
            handle_stats(UserId(user), period.into(), recompute).await?;
        }
    }

    tracing::info!("Application has finished successfully.");

    Ok(())
}

// --- "Run" Subcommand Logic ---

async fn handle_run(feed: PathBuf, users: PathBuf, pairs: PathBuf) -> Result<()> {
    // --- 1. Initialization ---
    let settings = app_config::load_settings()?;
    tracing::info!(environment = %settings.app.environment, "Application settings loaded successfully.");
    let users = app_config::load_users(&users)?;
    let pairs = app_config::load_pairs(&pairs)?;
    let entries = replay::load_feed(&feed)?;
    tracing::info!(users = users.len(), pairs = pairs.len(), entries = entries.len(), "Inputs loaded.");

    let store = open_store(&settings).await?;
    seed_pairs(store.as_ref(), pairs).await?;

    // --- 2. Component Instantiation ---
    let exchange = Arc::new(SimulatedExchange::new(settings.simulation.clone()));
    let bus = NotificationBus::new(settings.engine.notification_capacity);
    let notifier = tokio::spawn(log_notifications(bus.subscribe()));

    let engine = Engine::new(&settings, store.clone(), exchange.clone(), bus);
    for user in users {
        engine.apply_user_config(user)?;
    }

    // --- 3. Replay ---
    let summary = replay::run(&engine, &exchange, entries).await?;

    let at = summary.last_at.unwrap_or_else(Utc::now);
    report::print_replay_summary(&summary);
    for user_id in &summary.users {
        let stats = engine.statistics(*user_id, PeriodType::AllTime, at).await?;
        report::print_statistics(&stats);
    }

    // Dropping the engine closes the notification channel.
    drop(engine);
    notifier.await?;
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn Store>> {
    Ok(match &settings.database {
        Some(database) => {
            let store = database::connect(database).await?;
            tracing::info!("Database connection established and migrations are up-to-date.");
            Arc::new(store)
        }
        None => {
            tracing::warn!("No database configured. State lives in memory for this run only.");
            Arc::new(InMemoryStore::new())
        }
    })
}

/// Inserts pairs the store does not know yet. Existing pairs keep their statistics.
async fn seed_pairs(store: &dyn Store, pairs: Vec<TradingPair>) -> Result<()> {
    let mut changes = Changeset::new();
    for pair in pairs {
        match store.pair(&pair.symbol).await {
            Ok(_) => {}
            Err(database::Error::NotFound { .. }) => changes = changes.pair(pair),
            Err(e) => return Err(e.into()),
        }
    }
    if !changes.is_empty() {
        tracing::info!(count = changes.pairs.len(), "Seeding trading pairs.");
        store.commit(changes).await?;
    }
    Ok(())
}

async fn log_notifications(mut rx: broadcast::Receiver<events::NotificationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                tracing::info!(target: "notifications", user_id = %event.user_id(), kind = event.kind(), %payload);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification log fell behind.");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// --- "CheckConfig" Subcommand Logic ---

fn handle_check_config(users: PathBuf, pairs: PathBuf) -> Result<()> {
    let settings = app_config::load_settings()?;
    let users: Vec<UserConfig> = app_config::load_users(&users)?;
    let pairs = app_config::load_pairs(&pairs)?;

    println!("\n--- Configuration OK ---");
    println!("  - Environment: {}", settings.app.environment);
    println!("  - Database: {}", if settings.database.is_some() { "postgres" } else { "in-memory" });
    println!(
        "  - Partial targets: {:?} | Breakeven at {}R",
        settings.lifecycle.partial_targets.iter().map(|t| (t.r_multiple, t.close_percent)).collect::<Vec<_>>(),
        settings.lifecycle.breakeven_r
    );
    for user in &users {
        println!(
            "  - User {}: budget {} | risk {}% | max {} concurrent | min {}R, {} factors | trading {}",
            user.user_id,
            user.risk.budget,
            user.risk.risk_per_trade_percent,
            user.risk.max_concurrent_trades,
            user.min_rr_ratio,
            user.min_confluence,
            if user.trading_enabled { "on" } else { "off" }
        );
    }
    println!(
        "  - Setup quality bar: {}% win rate after {} trades",
        settings.quality.min_win_rate, settings.quality.min_sample_size
    );
    for pair in &pairs {
        println!("  - Pair {}: {:?} / {:?} volatility", pair.symbol, pair.asset_class, pair.volatility_tier);
    }
    Ok(())
}

// --- "Stats" Subcommand Logic ---

async fn handle_stats(user_id: UserId, period: PeriodType, recompute: bool) -> Result<()> {
    let settings = app_config::load_settings()?;
    let Some(database) = &settings.database else {
        anyhow::bail!("Statistics need a database. Set [database] or APP_DATABASE__URL.");
    };
    let store = database::connect(database).await?;
    let key = StatisticsKey::containing(user_id, period, Utc::now());

    let stats = if recompute {
        let outcomes: Vec<TradeOutcome> = store
            .trades_for_user(user_id)
            .await?
            .iter()
            .filter_map(TradeOutcome::from_trade)
            .collect();
        AnalyticsEngine::new().recompute(key, &outcomes)
    } else {
        store.statistics(&key).await?.unwrap_or_else(|| analytics::Statistics::empty(key))
    };

    report::print_statistics(&stats);
    Ok(())
}
