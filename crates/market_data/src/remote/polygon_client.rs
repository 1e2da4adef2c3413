use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use common::models::Bar;

use crate::error::MarketDataError;
use crate::remote::aggs_response::AggsResponse;
use crate::traits::{MarketDataSource, RemoteResponse};

/// Aggregate size requested from Polygon, e.g. 1 x "minute".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarSpan {
    pub multiplier: u32,
    pub timespan: String,
}

impl Default for BarSpan {
    fn default() -> Self {
        Self {
            multiplier: 1,
            timespan: "minute".to_string(),
        }
    }
}

/// REST client for the Polygon.io aggregates endpoint.
#[derive(Clone)]
pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: String,
    bar_span: BarSpan,
    history_window: chrono::Duration,
}

impl PolygonClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MarketDataError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MarketDataError::Config("empty API key".to_string()));
        }

        let client = Client::builder()
            .user_agent("market_brain/0.1.0")
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            bar_span: BarSpan::default(),
            history_window: chrono::Duration::days(7),
        })
    }

    pub fn with_bar_span(mut self, bar_span: BarSpan) -> Self {
        self.bar_span = bar_span;
        self
    }

    /// How far back the provider is asked to look. Must comfortably cover
    /// `lookback` bars across weekends and session breaks.
    pub fn with_history_window(mut self, window: chrono::Duration) -> Self {
        self.history_window = window;
        self
    }

    /// Cheap authenticated request used to confirm the credential and the
    /// network path before the client is handed to an engine.
    pub async fn check_connectivity(&self) -> Result<(), MarketDataError> {
        let url = format!("{}/v1/marketstatus/now", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;

        Self::check_status(response).await.map(|_| ())
    }

    pub fn aggregates_url(&self, symbol: &str, to: DateTime<Utc>) -> String {
        let from = to - self.history_window;
        format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            self.bar_span.multiplier,
            self.bar_span.timespan,
            from.timestamp_millis(),
            to.timestamp_millis()
        )
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, MarketDataError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(MarketDataError::RateLimited(body)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(MarketDataError::Unauthorized {
                    status: status.as_u16(),
                    body,
                })
            }
            _ => Err(MarketDataError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl MarketDataSource for PolygonClient {
    async fn fetch_recent_bars(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let url = self.aggregates_url(symbol, Utc::now());
        let limit = lookback.max(1).to_string();

        debug!("Fetching {} bars for {}", limit, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("adjusted", "true"),
                ("sort", "desc"),
                ("limit", limit.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let response = match Self::check_status(response).await {
            Ok(r) => r,
            Err(e) => {
                if e.is_rate_limit() {
                    warn!("Rate limit hit while fetching bars for {}", symbol);
                }
                return Err(e);
            }
        };

        let text = response.text().await?;
        let payload = serde_json::from_str::<AggsResponse>(&text)?;
        let mut bars = payload.to_domain()?;

        if bars.len() > lookback {
            bars.drain(..bars.len() - lookback);
        }
        Ok(bars)
    }
}
