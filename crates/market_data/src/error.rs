use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP 429: Too Many Requests ({0})")]
    RateLimited(String),
    #[error("HTTP {status}: credential rejected: {body}")]
    Unauthorized { status: u16, body: String },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Provider reported an error: {0}")]
    Api(String),
    #[error("Invalid market data configuration: {0}")]
    Config(String),
}

impl MarketDataError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Errors that will not go away by retrying with the same settings.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Config(_))
    }
}
