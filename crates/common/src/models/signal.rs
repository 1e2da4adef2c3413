use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(ValidationError::UnknownDirection(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("signal has an empty symbol")]
    MissingSymbol,
    #[error("signal for {0} has no direction")]
    MissingDirection(String),
    #[error("unknown direction '{0}', expected long or short")]
    UnknownDirection(String),
    #[error("signal for {0} has no entry price")]
    MissingEntryPrice(String),
    #[error("entry price must be a positive number, got {0}")]
    InvalidEntryPrice(f64),
    #[error("probability score must be within [0, 1], got {0}")]
    InvalidProbability(f64),
}

/// Raw evaluator output. Evaluators are pluggable, so required fields stay
/// optional here and are enforced by [`TradeSignal::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub direction: Option<Direction>,
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub probability_score: Option<f64>,
}

impl TradeSignal {
    pub fn new(symbol: impl Into<String>, direction: Direction, entry_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            direction: Some(direction),
            entry_price: Some(entry_price),
            probability_score: None,
        }
    }

    pub fn with_probability(mut self, probability_score: f64) -> Self {
        self.probability_score = Some(probability_score);
        self
    }

    pub fn validate(&self) -> Result<ValidatedSignal, ValidationError> {
        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            return Err(ValidationError::MissingSymbol);
        }

        let direction = self
            .direction
            .ok_or_else(|| ValidationError::MissingDirection(symbol.to_string()))?;

        let entry_price = self
            .entry_price
            .ok_or_else(|| ValidationError::MissingEntryPrice(symbol.to_string()))?;
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(ValidationError::InvalidEntryPrice(entry_price));
        }

        if let Some(p) = self.probability_score {
            if !(0.0..=1.0).contains(&p) {
                return Err(ValidationError::InvalidProbability(p));
            }
        }

        Ok(ValidatedSignal {
            symbol: symbol.to_string(),
            direction,
            entry_price,
            probability_score: self.probability_score,
        })
    }
}

/// A signal whose required fields are known to be present and in range.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSignal {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub probability_score: Option<f64>,
}
