// In crates/database/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to connect to the database")]
    ConnectionError(#[from] sqlx::Error),
    #[error("Database migration failed: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to (de)serialize a stored document: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("No {kind} found for {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Trade {trade_id} is already counted in {bucket}")]
    AlreadyApplied { trade_id: String, bucket: String },
    /// The store refused or failed to apply a write.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound { kind, id: id.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
