use async_trait::async_trait;
use common::models::Bar;

use crate::error::MarketDataError;

/// Conversion from a provider payload into domain models.
pub trait RemoteResponse<T> {
    fn to_domain(&self) -> Result<T, MarketDataError>;
}

/// "Fetch recent bars for symbol S".
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Returns at most `lookback` bars, oldest first.
    async fn fetch_recent_bars(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<Bar>, MarketDataError>;
}
