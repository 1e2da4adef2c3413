use chrono::{DateTime, Utc};

use crate::models::Bar;

/// Snapshot handed to the signal evaluator once per cycle.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    /// Oldest first.
    pub bars: Vec<Bar>,
}

impl MarketState {
    pub fn new(symbol: impl Into<String>, as_of: DateTime<Utc>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            as_of,
            bars,
        }
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}
