//! Mocks shared by the engine tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use mockall::mock;

use common::models::{Bar, MarketState, RegimeState, TradeSignal};
use market_data::{MarketDataError, MarketDataSource};
use storage::{NewTradeLog, RecordId, StorageError, TradeStore};
use strategy::{EvaluatorError, RegimeClassifier, SignalEvaluator};

use crate::connectors::{MarketDataConnector, StorageConnector};
use crate::error::ConnectionError;
use crate::schedule::Clock;

mock! {
    pub Source {}

    #[async_trait]
    impl MarketDataSource for Source {
        async fn fetch_recent_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, MarketDataError>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl TradeStore for Store {
        async fn create_table_if_absent(&self) -> Result<(), StorageError>;
        async fn insert(&self, record: &NewTradeLog) -> Result<RecordId, StorageError>;
        async fn ping(&self) -> Result<(), StorageError>;
    }
}

mock! {
    pub MarketDataConn {}

    #[async_trait]
    impl MarketDataConnector for MarketDataConn {
        async fn connect(&self) -> Result<Arc<dyn MarketDataSource>, ConnectionError>;
    }
}

mock! {
    pub StorageConn {}

    #[async_trait]
    impl StorageConnector for StorageConn {
        async fn connect(&self) -> Result<Arc<dyn TradeStore>, ConnectionError>;
    }
}

mock! {
    pub Evaluator {}

    impl SignalEvaluator for Evaluator {
        fn evaluate(&self, state: &MarketState) -> Result<Option<TradeSignal>, EvaluatorError>;
    }
}

mock! {
    pub Classifier {}

    impl RegimeClassifier for Classifier {
        fn classify_regime(&self, recent_bars: &[Bar]) -> Result<RegimeState, EvaluatorError>;
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Monday 2025-03-03 14:30 UTC, inside a 07:00-20:00 session.
pub fn monday_afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap()
}

/// Saturday 2025-03-08 12:00 UTC.
pub fn saturday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap()
}

pub fn bars(n: usize, close: f64) -> Vec<Bar> {
    let start = monday_afternoon() - Duration::minutes(n as i64);
    (0..n)
        .map(|i| Bar {
            time: start + Duration::minutes(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 5.0,
        })
        .collect()
}
