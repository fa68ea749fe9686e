// In crates/database/src/postgres.rs

use crate::{Changeset, Error, Result, Store};
use analytics::{Statistics, StatisticsKey};
use app_config::types::DatabaseSettings;
use async_trait::async_trait;
use core_types::{Signal, SignalId, Symbol, Trade, TradeId, TradingPair, UserId};
use sqlx::types::Json;
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Records are stored as JSONB documents next to the columns we filter on.
#[derive(Debug, Clone)]
pub struct PgStore(PgPool);

/// Establishes a connection pool to the PostgreSQL database and runs migrations.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.url)
        .await?;

    // Run database migrations. This ensures the database schema is up-to-date.
    sqlx::migrate!("../../migrations").run(&pool).await?;

    tracing::info!("Connected to Postgres and applied migrations.");
    Ok(PgStore(pool))
}

impl PgStore {
    pub fn pool(&self) -> &PgPool {
        &self.0
    }
}

#[async_trait]
impl Store for PgStore {
    async fn pair(&self, symbol: &Symbol) -> Result<TradingPair> {
        let row: Option<(Json<TradingPair>,)> =
            sqlx::query_as("SELECT doc FROM trading_pairs WHERE symbol = $1")
                .bind(&symbol.0)
                .fetch_optional(&self.0)
                .await?;
        row.map(|(Json(pair),)| pair).ok_or_else(|| Error::not_found("trading pair", symbol))
    }

    async fn pairs(&self) -> Result<Vec<TradingPair>> {
        let rows: Vec<(Json<TradingPair>,)> =
            sqlx::query_as("SELECT doc FROM trading_pairs ORDER BY symbol")
                .fetch_all(&self.0)
                .await?;
        Ok(rows.into_iter().map(|(Json(pair),)| pair).collect())
    }

    async fn signal(&self, id: SignalId) -> Result<Signal> {
        let row: Option<(Json<Signal>,)> = sqlx::query_as("SELECT doc FROM signals WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.0)
            .await?;
        row.map(|(Json(signal),)| signal).ok_or_else(|| Error::not_found("signal", id))
    }

    async fn trade(&self, id: TradeId) -> Result<Trade> {
        let row: Option<(Json<Trade>,)> = sqlx::query_as("SELECT doc FROM trades WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.0)
            .await?;
        row.map(|(Json(trade),)| trade).ok_or_else(|| Error::not_found("trade", id))
    }

    async fn trades_for_user(&self, user_id: UserId) -> Result<Vec<Trade>> {
        let rows: Vec<(Json<Trade>,)> =
            sqlx::query_as("SELECT doc FROM trades WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id.0)
                .fetch_all(&self.0)
                .await?;
        Ok(rows.into_iter().map(|(Json(trade),)| trade).collect())
    }

    async fn active_trades(&self) -> Result<Vec<Trade>> {
        let rows: Vec<(Json<Trade>,)> = sqlx::query_as(
            "SELECT doc FROM trades WHERE status IN ('pending', 'open', 'partial_closed') ORDER BY created_at",
        )
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(|(Json(trade),)| trade).collect())
    }

    async fn statistics(&self, key: &StatisticsKey) -> Result<Option<Statistics>> {
        let row: Option<(Json<Statistics>,)> = sqlx::query_as(
            "SELECT doc FROM statistics WHERE user_id = $1 AND period_type = $2 AND period_start = $3",
        )
        .bind(key.user_id.0)
        .bind(key.period_type.as_str())
        .bind(key.period_start)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(|(Json(stats),)| stats))
    }

    async fn statistics_for_user(&self, user_id: UserId) -> Result<Vec<Statistics>> {
        let rows: Vec<(Json<Statistics>,)> = sqlx::query_as(
            "SELECT doc FROM statistics WHERE user_id = $1 ORDER BY period_type, period_start",
        )
        .bind(user_id.0)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(|(Json(stats),)| stats).collect())
    }

    async fn statistics_applied(&self, key: &StatisticsKey, trade_id: TradeId) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM statistics_applied
            WHERE user_id = $1 AND period_type = $2 AND period_start = $3 AND trade_id = $4
            "#,
        )
        .bind(key.user_id.0)
        .bind(key.period_type.as_str())
        .bind(key.period_start)
        .bind(trade_id.0)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.is_some())
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let mut tx = self.0.begin().await?;

        // Ledger rows go first. A conflict means another commit already
        // counted the trade, and dropping `tx` rolls everything back.
        for (key, trade_id) in &changes.applied {
            let inserted = sqlx::query(
                r#"
                INSERT INTO statistics_applied (user_id, period_type, period_start, trade_id)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(key.user_id.0)
            .bind(key.period_type.as_str())
            .bind(key.period_start)
            .bind(trade_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted == 0 {
                return Err(Error::AlreadyApplied { trade_id: trade_id.to_string(), bucket: key.period_type.to_string() });
            }
        }

        for pair in &changes.pairs {
            sqlx::query(
                r#"
                INSERT INTO trading_pairs (symbol, is_active, doc, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (symbol) DO UPDATE
                SET is_active = EXCLUDED.is_active, doc = EXCLUDED.doc, updated_at = now()
                "#,
            )
            .bind(&pair.symbol.0)
            .bind(pair.is_active)
            .bind(Json(pair))
            .execute(&mut *tx)
            .await?;
        }

        for signal in &changes.signals {
            sqlx::query(
                r#"
                INSERT INTO signals (id, user_id, symbol, created_at, doc)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc
                "#,
            )
            .bind(signal.id.0)
            .bind(signal.user_id.0)
            .bind(&signal.symbol.0)
            .bind(signal.created_at)
            .bind(Json(signal))
            .execute(&mut *tx)
            .await?;
        }

        for trade in &changes.trades {
            sqlx::query(
                r#"
                INSERT INTO trades (id, user_id, symbol, status, created_at, doc, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                ON CONFLICT (id) DO UPDATE
                SET status = EXCLUDED.status, doc = EXCLUDED.doc, updated_at = now()
                "#,
            )
            .bind(trade.id.0)
            .bind(trade.user_id.0)
            .bind(&trade.symbol.0)
            .bind(trade.status.as_str())
            .bind(trade.created_at)
            .bind(Json(trade))
            .execute(&mut *tx)
            .await?;
        }

        for stats in &changes.statistics {
            sqlx::query(
                r#"
                INSERT INTO statistics (user_id, period_type, period_start, doc, updated_at)
                VALUES ($1, $2, $3, $4, now())
                ON CONFLICT (user_id, period_type, period_start) DO UPDATE
                SET doc = EXCLUDED.doc, updated_at = now()
                "#,
            )
            .bind(stats.key.user_id.0)
            .bind(stats.key.period_type.as_str())
            .bind(stats.key.period_start)
            .bind(Json(stats))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
