pub mod events;
pub mod messages;
pub mod reminders;
pub mod summaries;

use mailroom_core::error::{MailroomError, Result};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

pub use messages::content_hash;

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        info!("Connected to SQLite at {}", url);

        let storage = Self { pool };
        storage.migrate().await?;

        Ok(storage)
    }

    /// A private in-memory database on a single connection that is never
    /// recycled, so the schema survives for the life of the pool.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage_err)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.migrate().await?;

        Ok(storage)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MailroomError::Storage(e.to_string()))?;

        info!("SQLite migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn storage_err(e: sqlx::Error) -> MailroomError {
    MailroomError::Storage(e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Reads a text column holding a strum-encoded enum.
pub(crate) fn enum_column<T: FromStr>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.get(column);
    raw.parse()
        .map_err(|_| MailroomError::Storage(format!("Unexpected value '{}' in column {}", raw, column)))
}

pub(crate) fn opt_enum_column<T: FromStr>(row: &SqliteRow, column: &str) -> Result<Option<T>> {
    match row.get::<Option<String>, _>(column) {
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            MailroomError::Storage(format!("Unexpected value '{}' in column {}", raw, column))
        }),
        None => Ok(None),
    }
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.get(column);
    serde_json::from_str(&raw)
        .map_err(|e| MailroomError::Storage(format!("Corrupt JSON in column {}: {}", column, e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| MailroomError::Internal(e.to_string()))
}
