use std::time::Duration;

use market_data::MarketDataError;
use storage::LogError;
use strategy::EvaluatorError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(String),
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

/// Why a dependency could not be (re)established.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Missing or rejected credential / connection string. Retrying only
    /// helps once the environment is fixed.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connectivity error: {0}")]
    Connectivity(String),
}

/// Anything that can go wrong inside one evaluation cycle. Always caught by
/// the engine loop.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("{0} handle is not connected")]
    NotConnected(&'static str),
    #[error("market data unavailable: {0}")]
    MarketData(#[from] MarketDataError),
    #[error("market data request timed out after {0:?}")]
    MarketDataTimeout(Duration),
    #[error("evaluator failed: {0}")]
    Evaluator(#[from] EvaluatorError),
    #[error("evaluator produced a signal for {got}, this engine monitors {expected}")]
    ForeignSymbol { expected: String, got: String },
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("cycle panicked: {0}")]
    Panicked(String),
}
