use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC aggregate as delivered by the market-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Start of the aggregate window.
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
