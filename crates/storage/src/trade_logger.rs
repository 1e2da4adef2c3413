use chrono::Utc;
use tracing::{error, info, warn};

use common::models::TradeSignal;

use crate::error::LogError;
use crate::models::{NewTradeLog, RecordId};
use crate::trade_store::TradeStore;

/// Validates evaluator output and writes it to the shared trade log.
pub struct TradeLogger;

impl TradeLogger {
    /// A signal that fails validation never reaches the store. A failed
    /// write leaves no row behind and the store usable for the next call.
    pub async fn log(
        store: &dyn TradeStore,
        signal: &TradeSignal,
        model_version: &str,
    ) -> Result<RecordId, LogError> {
        let valid = match signal.validate() {
            Ok(v) => v,
            Err(e) => {
                warn!("Discarding malformed signal for '{}': {}", signal.symbol, e);
                return Err(e.into());
            }
        };

        let record = NewTradeLog::from_signal(&valid, model_version, Utc::now());
        match store.insert(&record).await {
            Ok(id) => {
                info!(
                    "Successfully logged new trade #{}: {} {} at {} ({})",
                    id, valid.direction, valid.symbol, valid.entry_price, model_version
                );
                Ok(id)
            }
            Err(e) => {
                error!("Failed to log trade to database for {}: {}", valid.symbol, e);
                Err(e.into())
            }
        }
    }
}
