use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{info, warn};

use market_data::MarketDataSource;
use storage::TradeStore;

use crate::connectors::{MarketDataConnector, StorageConnector};
use crate::error::ConnectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// A call through a live handle failed. Treated like Disconnected and
    /// replaced on the next `ensure_connected`.
    Degraded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Per-dependency readiness reported to the engine loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub market_data: LinkStatus,
    pub storage: LinkStatus,
}

impl ConnectionStatus {
    pub fn is_ready(&self) -> bool {
        self.market_data == LinkStatus::Connected && self.storage == LinkStatus::Connected
    }
}

struct ConnectionHandle<T: ?Sized> {
    name: &'static str,
    client: Option<Arc<T>>,
    state: ConnectionState,
    last_error: Option<ConnectionError>,
}

impl<T: ?Sized> ConnectionHandle<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            client: None,
            state: ConnectionState::Disconnected,
            last_error: None,
        }
    }

    fn link(&self) -> LinkStatus {
        match self.state {
            ConnectionState::Connected => LinkStatus::Connected,
            _ => LinkStatus::Disconnected,
        }
    }

    fn client(&self) -> Option<Arc<T>> {
        match self.state {
            ConnectionState::Connected => self.client.clone(),
            _ => None,
        }
    }

    fn mark_connected(&mut self, label: &str, client: Arc<T>) {
        match &self.state {
            ConnectionState::Connected => {}
            ConnectionState::Disconnected if self.last_error.is_none() => {
                info!("{}: {} connected", label, self.name);
            }
            _ => info!("{}: {} reconnected", label, self.name),
        }
        self.client = Some(client);
        self.state = ConnectionState::Connected;
        self.last_error = None;
    }

    fn mark_disconnected(&mut self, label: &str, error: ConnectionError) {
        warn!("{}: {} disconnected: {}", label, self.name, error);
        self.client = None;
        self.state = ConnectionState::Disconnected;
        self.last_error = Some(error);
    }

    fn degrade(&mut self, label: &str, reason: String) {
        if self.state == ConnectionState::Connected {
            warn!("{}: {} degraded: {}", label, self.name, reason);
        }
        self.client = None;
        self.state = ConnectionState::Degraded(reason);
    }
}

/// Owns one engine's market data client and storage handle.
///
/// Clients are only handed out while their handle is Connected; a handle in
/// any other state gets exactly one reconnect attempt per
/// `ensure_connected` call.
pub struct ConnectionManager {
    label: String,
    market_data_connector: Box<dyn MarketDataConnector>,
    storage_connector: Box<dyn StorageConnector>,
    connect_timeout: Duration,
    market_data: ConnectionHandle<dyn MarketDataSource>,
    storage: ConnectionHandle<dyn TradeStore>,
}

impl ConnectionManager {
    pub fn new(
        label: impl Into<String>,
        market_data_connector: Box<dyn MarketDataConnector>,
        storage_connector: Box<dyn StorageConnector>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            label: label.into(),
            market_data_connector,
            storage_connector,
            connect_timeout,
            market_data: ConnectionHandle::new("market data"),
            storage: ConnectionHandle::new("storage"),
        }
    }

    pub async fn ensure_connected(&mut self) -> ConnectionStatus {
        if self.market_data.state != ConnectionState::Connected {
            let attempt = self.market_data_connector.connect();
            establish(&mut self.market_data, &self.label, self.connect_timeout, attempt).await;
        }
        if self.storage.state != ConnectionState::Connected {
            let attempt = self.storage_connector.connect();
            establish(&mut self.storage, &self.label, self.connect_timeout, attempt).await;
        }
        self.status()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            market_data: self.market_data.link(),
            storage: self.storage.link(),
        }
    }

    pub fn market_data(&self) -> Option<Arc<dyn MarketDataSource>> {
        self.market_data.client()
    }

    pub fn storage(&self) -> Option<Arc<dyn TradeStore>> {
        self.storage.client()
    }

    pub fn market_data_state(&self) -> &ConnectionState {
        &self.market_data.state
    }

    pub fn storage_state(&self) -> &ConnectionState {
        &self.storage.state
    }

    pub fn market_data_error(&self) -> Option<&ConnectionError> {
        self.market_data.last_error.as_ref()
    }

    pub fn storage_error(&self) -> Option<&ConnectionError> {
        self.storage.last_error.as_ref()
    }

    pub fn degrade_market_data(&mut self, reason: impl Into<String>) {
        self.market_data.degrade(&self.label, reason.into());
    }

    pub fn degrade_storage(&mut self, reason: impl Into<String>) {
        self.storage.degrade(&self.label, reason.into());
    }
}

async fn establish<T, F>(handle: &mut ConnectionHandle<T>, label: &str, timeout: Duration, attempt: F)
where
    T: ?Sized,
    F: Future<Output = Result<Arc<T>, ConnectionError>>,
{
    let result = match time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Connectivity(format!(
            "connect timed out after {:?}",
            timeout
        ))),
    };

    match result {
        Ok(client) => handle.mark_connected(label, client),
        Err(e) => handle.mark_disconnected(label, e),
    }
}
