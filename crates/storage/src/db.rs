use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::StorageError;
use crate::repositories::TradeLogRepository;

pub const SCHEMA: &str = include_str!("../../../sql/schema.sql");

/// Opens the shared trade log and bootstraps its schema.
///
/// `timeout` bounds both pool acquisition and SQLite's busy wait, so no
/// storage call made through this pool can block indefinitely.
pub async fn connect_pool(database_url: &str, timeout: Duration) -> Result<SqlitePool, StorageError> {
    if database_url.trim().is_empty() {
        return Err(StorageError::Config("empty database URL".to_string()));
    }
    if !database_url.starts_with("sqlite:") {
        return Err(StorageError::Config(format!(
            "unsupported database URL scheme: {}",
            database_url
        )));
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StorageError::Config(format!("{}: {}", database_url, e)))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(timeout)
        .statement_cache_capacity(100);

    // Every connection to an in-memory database sees its own empty database.
    let pool_options = if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };

    let pool = pool_options
        .acquire_timeout(timeout)
        .connect_with(options)
        .await?;

    // Column check first: the index DDL fails on an incompatible table.
    TradeLogRepository::create_table_if_absent(&pool).await?;
    info!("Trade log schema ready");
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
