use chrono::{DateTime, Utc};
use serde::Deserialize;

use common::models::Bar;

use crate::{error::MarketDataError, traits::RemoteResponse};

/// Envelope of `/v2/aggs/ticker/{ticker}/range/...`.
#[derive(Deserialize, Debug)]
pub struct AggsResponse {
    pub status: String,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<AggBar>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AggBar {
    #[serde(rename(deserialize = "t"))]
    pub start_time: i64,
    #[serde(rename(deserialize = "o"))]
    pub open_price: f64,
    #[serde(rename(deserialize = "h"))]
    pub high_price: f64,
    #[serde(rename(deserialize = "l"))]
    pub low_price: f64,
    #[serde(rename(deserialize = "c"))]
    pub close_price: f64,
    #[serde(rename(deserialize = "v"), default)]
    pub volume: f64,
}

impl RemoteResponse<Vec<Bar>> for AggsResponse {
    fn to_domain(&self) -> Result<Vec<Bar>, MarketDataError> {
        if self.status == "ERROR" || self.status == "NOT_AUTHORIZED" {
            let reason = self
                .error
                .clone()
                .or_else(|| self.message.clone())
                .unwrap_or_else(|| self.status.clone());
            if self.status == "NOT_AUTHORIZED" {
                return Err(MarketDataError::Unauthorized {
                    status: 401,
                    body: reason,
                });
            }
            return Err(MarketDataError::Api(reason));
        }

        let mut bars = Vec::with_capacity(self.results.as_ref().map_or(0, Vec::len));
        for agg in self.results.iter().flatten() {
            let time = DateTime::<Utc>::from_timestamp_millis(agg.start_time).ok_or_else(|| {
                MarketDataError::Api(format!("bar timestamp out of range: {}", agg.start_time))
            })?;
            bars.push(Bar {
                time,
                open: agg.open_price,
                high: agg.high_price,
                low: agg.low_price,
                close: agg.close_price,
                volume: agg.volume,
            });
        }
        bars.sort_by_key(|b| b.time);
        Ok(bars)
    }
}
