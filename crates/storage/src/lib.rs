pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod trade_logger;
pub mod trade_store;

pub use error::{LogError, StorageError};
pub use models::{NewTradeLog, RecordId, TradeLogRecord};
pub use trade_logger::TradeLogger;
pub use trade_store::{SqliteTradeStore, TradeStore};
