use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use market_data::{MarketDataError, MarketDataSource, PolygonClient};
use storage::{SqliteTradeStore, StorageError, TradeStore};

use crate::error::ConnectionError;

/// Produces a ready market data client, or the reason it could not.
#[async_trait]
pub trait MarketDataConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MarketDataSource>, ConnectionError>;
}

/// Produces a ready trade store with the schema in place.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn TradeStore>, ConnectionError>;
}

pub struct PolygonConnector {
    api_key: Option<String>,
    api_key_var: String,
    base_url: String,
    timeout: Duration,
}

impl PolygonConnector {
    pub fn new(
        api_key: Option<String>,
        api_key_var: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            api_key_var: api_key_var.into(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

fn market_data_error(e: MarketDataError) -> ConnectionError {
    if e.is_config() {
        ConnectionError::Config(e.to_string())
    } else {
        ConnectionError::Connectivity(e.to_string())
    }
}

#[async_trait]
impl MarketDataConnector for PolygonConnector {
    async fn connect(&self) -> Result<Arc<dyn MarketDataSource>, ConnectionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ConnectionError::Config(format!("{} is not set", self.api_key_var)))?;

        let client =
            PolygonClient::new(api_key, self.base_url.as_str(), self.timeout).map_err(market_data_error)?;
        client.check_connectivity().await.map_err(market_data_error)?;

        Ok(Arc::new(client))
    }
}

pub struct SqliteConnector {
    database_url: Option<String>,
    timeout: Duration,
}

impl SqliteConnector {
    pub fn new(database_url: Option<String>, timeout: Duration) -> Self {
        Self {
            database_url,
            timeout,
        }
    }
}

fn storage_error(e: StorageError) -> ConnectionError {
    match e {
        StorageError::Config(_) | StorageError::SchemaMismatch { .. } => {
            ConnectionError::Config(e.to_string())
        }
        StorageError::Database(_) => ConnectionError::Connectivity(e.to_string()),
    }
}

#[async_trait]
impl StorageConnector for SqliteConnector {
    async fn connect(&self) -> Result<Arc<dyn TradeStore>, ConnectionError> {
        let url = self
            .database_url
            .as_deref()
            .ok_or_else(|| ConnectionError::Config("DATABASE_URL is not set".to_string()))?;

        let store = SqliteTradeStore::connect(url, self.timeout)
            .await
            .map_err(storage_error)?;
        store.create_table_if_absent().await.map_err(storage_error)?;
        store.ping().await.map_err(storage_error)?;

        Ok(Arc::new(store))
    }
}
