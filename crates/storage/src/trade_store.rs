use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::connect_pool;
use crate::error::StorageError;
use crate::models::{NewTradeLog, RecordId};
use crate::repositories::TradeLogRepository;

/// Repository view of the shared trade log as seen by one engine.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn create_table_if_absent(&self) -> Result<(), StorageError>;

    /// Atomically inserts one record: on error no row is visible.
    async fn insert(&self, record: &NewTradeLog) -> Result<RecordId, StorageError>;

    /// Round trip used to confirm a freshly opened handle.
    async fn ping(&self) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct SqliteTradeStore {
    pool: SqlitePool,
}

impl SqliteTradeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let pool = connect_pool(database_url, timeout).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn create_table_if_absent(&self) -> Result<(), StorageError> {
        TradeLogRepository::create_table_if_absent(&self.pool).await
    }

    async fn insert(&self, record: &NewTradeLog) -> Result<RecordId, StorageError> {
        TradeLogRepository::insert(&self.pool, record).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
