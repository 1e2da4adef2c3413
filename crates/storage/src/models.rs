use chrono::{DateTime, Utc};
use sqlx::FromRow;

use common::models::ValidatedSignal;

/// Surrogate key of a `trade_logs` row.
pub type RecordId = i64;

/// One row of the shared `trade_logs` table. The outcome columns are
/// filled later by the reconciliation job, never by the engine.
#[derive(Debug, Clone, FromRow)]
pub struct TradeLogRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub model_version: String,
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub probability_score: Option<f64>,
    pub outcome: Option<String>,
    pub points_gained_lost: Option<f64>,
    pub max_favorable_excursion: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewTradeLog {
    pub timestamp: DateTime<Utc>,
    pub model_version: String,
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub probability_score: Option<f64>,
}

impl NewTradeLog {
    pub fn from_signal(
        signal: &ValidatedSignal,
        model_version: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            model_version: model_version.to_string(),
            symbol: signal.symbol.clone(),
            direction: signal.direction.as_str().to_string(),
            entry_price: signal.entry_price,
            probability_score: signal.probability_score,
        }
    }
}
