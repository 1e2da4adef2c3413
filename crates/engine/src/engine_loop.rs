use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ControlMessage};
use common::models::MarketState;
use storage::{LogError, RecordId, TradeLogger};
use strategy::{NeutralRegime, RegimeClassifier, SignalEvaluator};

use crate::config::{EngineSettings, InstrumentConfig};
use crate::connection::ConnectionManager;
use crate::error::CycleError;
use crate::schedule::{Clock, SchedulePolicy, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Connected,
    Disconnected,
}

/// How a cycle that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    MarketClosed,
    NeutralRegime,
    NoSignal,
    Logged(RecordId),
}

/// One always-on monitoring loop for a single instrument.
pub struct Engine {
    id: Uuid,
    key: String,
    symbol: String,
    model_version: String,
    schedule: SchedulePolicy,
    lookback: usize,
    settings: EngineSettings,
    connections: ConnectionManager,
    evaluator: Box<dyn SignalEvaluator>,
    regime: Option<Box<dyn RegimeClassifier>>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
    state: EngineState,
}

impl Engine {
    /// Regime-aware instruments start with the [`NeutralRegime`] stub, so
    /// they never evaluate until a real classifier is supplied.
    pub fn new(
        instrument: &InstrumentConfig,
        settings: EngineSettings,
        connections: ConnectionManager,
        evaluator: Box<dyn SignalEvaluator>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let regime: Option<Box<dyn RegimeClassifier>> = if instrument.regime_aware {
            Some(Box::new(NeutralRegime))
        } else {
            None
        };

        Self {
            id: Uuid::new_v4(),
            key: instrument.key.clone(),
            symbol: instrument.symbol.clone(),
            model_version: instrument.model_version.clone(),
            schedule: instrument.schedule,
            lookback: instrument.lookback,
            settings,
            connections,
            evaluator,
            regime,
            clock: Arc::new(SystemClock),
            shutdown,
            state: EngineState::Initializing,
        }
    }

    /// Makes the engine regime-aware with the given classifier.
    pub fn with_regime_classifier(mut self, classifier: Box<dyn RegimeClassifier>) -> Self {
        self.regime = Some(classifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_regime_aware(&self) -> bool {
        self.regime.is_some()
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connections
    }

    /// Runs cycles until shutdown is requested. A cycle in progress is
    /// always allowed to finish; only the sleeps between cycles are cut
    /// short.
    pub async fn run_until_shutdown(&mut self, supervisor_tx: Option<&mpsc::Sender<ControlMessage>>) {
        info!(
            "{}: engine {} starting (model {}, {})",
            self.symbol,
            self.id,
            self.model_version,
            match &self.schedule {
                SchedulePolicy::AlwaysOpen => "24/7".to_string(),
                SchedulePolicy::Session(window) => window.to_string(),
            }
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let status = self.connections.ensure_connected().await;
            if !status.is_ready() {
                self.set_state(EngineState::Disconnected);
                warn!(
                    "{}: not connected (market data {:?}, storage {:?}), retrying in {:?}",
                    self.symbol, status.market_data, status.storage, self.settings.reconnect_delay
                );
                notify(supervisor_tx, ControlMessage::Heartbeat(self.id));
                if !self.pause(self.settings.reconnect_delay).await {
                    break;
                }
                continue;
            }
            self.set_state(EngineState::Connected);

            let now = self.clock.now();
            let result = match AssertUnwindSafe(self.run_cycle(now)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(CycleError::Panicked(panic_message(payload.as_ref()))),
            };
            match result {
                Ok(outcome) => debug!("{}: cycle at {} ended with {:?}", self.symbol, now, outcome),
                Err(e) => {
                    error!("{}: cycle at {} failed: {}", self.symbol, now.to_rfc3339(), e);
                    notify(supervisor_tx, ControlMessage::Error(self.id, e.to_string()));
                }
            }

            notify(supervisor_tx, ControlMessage::Heartbeat(self.id));
            if !self.pause(self.settings.cadence).await {
                break;
            }
        }

        info!("{}: engine stopped", self.symbol);
    }

    /// One pass of gate, regime check, evaluation and logging. Expects the
    /// connections to be ready; any failure is returned for the loop to
    /// report.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        if let SchedulePolicy::Session(window) = &self.schedule {
            if !window.contains(now) {
                info!("{}: Market is closed. Standing by.", self.symbol);
                return Ok(CycleOutcome::MarketClosed);
            }
            info!("{}: Market is open. Checking for signals...", self.symbol);
        }

        let source = self
            .connections
            .market_data()
            .ok_or(CycleError::NotConnected("market data"))?;
        let io_timeout = self.settings.io_timeout;
        let bars = match time::timeout(io_timeout, source.fetch_recent_bars(&self.symbol, self.lookback)).await {
            Ok(Ok(bars)) => bars,
            Ok(Err(e)) => {
                self.connections.degrade_market_data(e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                self.connections.degrade_market_data("request timed out");
                return Err(CycleError::MarketDataTimeout(io_timeout));
            }
        };
        debug!("{}: fetched {} bars", self.symbol, bars.len());

        if let Some(classifier) = &self.regime {
            let regime = classifier.classify_regime(&bars)?;
            if !regime.is_trending() {
                info!("{}: Regime is neutral, skipping evaluation", self.symbol);
                return Ok(CycleOutcome::NeutralRegime);
            }
            info!("{}: Regime is {}", self.symbol, regime);
        }

        let state = MarketState::new(self.symbol.clone(), now, bars);
        let Some(signal) = self.evaluator.evaluate(&state)? else {
            info!("{}: No signals found", self.symbol);
            return Ok(CycleOutcome::NoSignal);
        };

        // An empty symbol is left to the logger's validation.
        if !signal.symbol.trim().is_empty() && signal.symbol != self.symbol {
            return Err(CycleError::ForeignSymbol {
                expected: self.symbol.clone(),
                got: signal.symbol,
            });
        }

        let store = self
            .connections
            .storage()
            .ok_or(CycleError::NotConnected("storage"))?;
        match TradeLogger::log(store.as_ref(), &signal, &self.model_version).await {
            Ok(id) => Ok(CycleOutcome::Logged(id)),
            Err(e) => {
                if let LogError::Persistence(cause) = &e {
                    if cause.is_connectivity() {
                        self.connections.degrade_storage(cause.to_string());
                    }
                }
                Err(e.into())
            }
        }
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!("{}: {:?} -> {:?}", self.symbol, self.state, state);
            self.state = state;
        }
    }

    /// Sleeps for `duration` unless shutdown arrives first. Returns false on
    /// shutdown.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = time::sleep(duration) => true,
            _ = shutdown_requested(&mut self.shutdown) => false,
        }
    }
}

/// Resolves once shutdown is flagged or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn notify(supervisor_tx: Option<&mpsc::Sender<ControlMessage>>, msg: ControlMessage) {
    if let Some(tx) = supervisor_tx {
        if let Err(e) = tx.try_send(msg) {
            debug!("Supervisor channel unavailable: {}", e);
        }
    }
}

#[async_trait]
impl Actor for Engine {
    fn name(&self) -> &str {
        &self.key
    }

    fn id(&self) -> Uuid {
        self.id
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        self.run_until_shutdown(Some(&supervisor_tx)).await;
        supervisor_tx.send(ControlMessage::Shutdown(self.id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierKind;
    use crate::error::ConnectionError;
    use crate::schedule::SessionWindow;
    use crate::testing::*;
    use chrono::NaiveTime;
    use common::models::{Direction, RegimeState, TradeSignal};
    use market_data::{MarketDataError, MarketDataSource};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::{NewTradeLog, StorageError, TradeStore};
    use strategy::EvaluatorError;
    use tokio::time::Instant;

    fn settings() -> EngineSettings {
        EngineSettings {
            cadence: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(300),
            io_timeout: Duration::from_secs(10),
        }
    }

    fn instrument(symbol: &str, schedule: SchedulePolicy, regime_aware: bool) -> InstrumentConfig {
        InstrumentConfig {
            key: "test".to_string(),
            symbol: symbol.to_string(),
            model_version: "test_v1.0".to_string(),
            schedule,
            regime_aware,
            classifier: ClassifierKind::Neutral,
            lookback: 100,
            api_key_var: "POLYGON_API_KEY".to_string(),
            api_key: None,
        }
    }

    fn session() -> SchedulePolicy {
        SchedulePolicy::Session(
            SessionWindow::new(
                5,
                NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            )
            .unwrap(),
        )
    }

    fn connections(source: MockSource, store: MockStore) -> ConnectionManager {
        let source: Arc<dyn MarketDataSource> = Arc::new(source);
        let store: Arc<dyn TradeStore> = Arc::new(store);

        let mut md = MockMarketDataConn::new();
        md.expect_connect().returning(move || Ok(source.clone()));
        let mut st = MockStorageConn::new();
        st.expect_connect().returning(move || Ok(store.clone()));

        ConnectionManager::new("test", Box::new(md), Box::new(st), Duration::from_secs(5))
    }

    fn source_with_bars() -> MockSource {
        let mut source = MockSource::new();
        source
            .expect_fetch_recent_bars()
            .returning(|_, n| Ok(bars(n.min(30), 65000.0)));
        source
    }

    fn long_signal(symbol: &str) -> TradeSignal {
        TradeSignal::new(symbol, Direction::Long, 65000.0).with_probability(0.8)
    }

    fn engine_for(
        instrument: &InstrumentConfig,
        connections: ConnectionManager,
        evaluator: MockEvaluator,
        now: DateTime<Utc>,
    ) -> (Engine, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let engine = Engine::new(instrument, settings(), connections, Box::new(evaluator), rx)
            .with_clock(Arc::new(FixedClock(now)));
        (engine, tx)
    }

    #[tokio::test]
    async fn test_closed_market_skips_everything() {
        let mut source = MockSource::new();
        source.expect_fetch_recent_bars().never();
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().never();

        let (mut engine, _tx) = engine_for(
            &instrument("I:NDX", session(), false),
            connections(source, MockStore::new()),
            evaluator,
            saturday_noon(),
        );
        engine.connections.ensure_connected().await;

        let outcome = engine.run_cycle(saturday_noon()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::MarketClosed);
    }

    #[tokio::test]
    async fn test_open_market_logs_signal() {
        let mut store = MockStore::new();
        store
            .expect_insert()
            .times(1)
            .withf(|r| {
                r.symbol == "I:NDX"
                    && r.direction == "long"
                    && r.model_version == "test_v1.0"
                    && r.probability_score == Some(0.8)
            })
            .returning(|_| Ok(7));
        let mut evaluator = MockEvaluator::new();
        evaluator
            .expect_evaluate()
            .times(1)
            .withf(|state| state.symbol == "I:NDX" && state.bars.len() == 30)
            .returning(|_| Ok(Some(long_signal("I:NDX"))));

        let (mut engine, _tx) = engine_for(
            &instrument("I:NDX", session(), false),
            connections(source_with_bars(), store),
            evaluator,
            monday_afternoon(),
        );
        engine.connections.ensure_connected().await;

        let outcome = engine.run_cycle(monday_afternoon()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Logged(7));
    }

    #[tokio::test]
    async fn test_always_open_ignores_weekend() {
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().times(1).returning(|_| Ok(None));

        let (mut engine, _tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections(source_with_bars(), MockStore::new()),
            evaluator,
            saturday_noon(),
        );
        engine.connections.ensure_connected().await;

        let outcome = engine.run_cycle(saturday_noon()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoSignal);
    }

    #[tokio::test]
    async fn test_trending_regime_reaches_evaluator() {
        let mut classifier = MockClassifier::new();
        classifier
            .expect_classify_regime()
            .times(1)
            .returning(|_| Ok(RegimeState::Bear));
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().times(1).returning(|_| Ok(None));

        let (engine, _tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, true),
            connections(source_with_bars(), MockStore::new()),
            evaluator,
            monday_afternoon(),
        );
        let mut engine = engine.with_regime_classifier(Box::new(classifier));
        engine.connections.ensure_connected().await;

        assert_eq!(
            engine.run_cycle(monday_afternoon()).await.unwrap(),
            CycleOutcome::NoSignal
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_market_data() {
        let mut source = MockSource::new();
        source
            .expect_fetch_recent_bars()
            .returning(|_, _| Err(MarketDataError::Status { status: 502, body: "bad gateway".to_string() }));
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().never();

        let (mut engine, _tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections(source, MockStore::new()),
            evaluator,
            monday_afternoon(),
        );
        engine.connections.ensure_connected().await;

        let result = engine.run_cycle(monday_afternoon()).await;
        assert!(matches!(result, Err(CycleError::MarketData(_))));
        assert!(!engine.connections.status().is_ready());
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_signals_are_not_written() {
        let mut store = MockStore::new();
        store.expect_insert().never();
        let calls = AtomicUsize::new(0);
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().times(2).returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(long_signal("X:ETHUSD")))
            } else {
                Ok(Some(TradeSignal {
                    symbol: "X:BTCUSD".to_string(),
                    direction: Some(Direction::Short),
                    entry_price: None,
                    probability_score: None,
                }))
            }
        });

        let (mut engine, _tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections(source_with_bars(), store),
            evaluator,
            monday_afternoon(),
        );
        engine.connections.ensure_connected().await;

        assert!(matches!(
            engine.run_cycle(monday_afternoon()).await,
            Err(CycleError::ForeignSymbol { .. })
        ));
        assert!(matches!(
            engine.run_cycle(monday_afternoon()).await,
            Err(CycleError::Log(LogError::Validation(_)))
        ));
        // Validation failures do not touch the connections.
        assert!(engine.connections.status().is_ready());
    }

    #[tokio::test]
    async fn test_storage_connectivity_loss_degrades_storage() {
        let mut store = MockStore::new();
        store
            .expect_insert()
            .returning(|_| Err(StorageError::Database(sqlx_pool_timeout())));
        let mut evaluator = MockEvaluator::new();
        evaluator
            .expect_evaluate()
            .returning(|_| Ok(Some(long_signal("X:BTCUSD"))));

        let (mut engine, _tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections(source_with_bars(), store),
            evaluator,
            monday_afternoon(),
        );
        engine.connections.ensure_connected().await;

        assert!(matches!(
            engine.run_cycle(monday_afternoon()).await,
            Err(CycleError::Log(LogError::Persistence(_)))
        ));
        assert_eq!(
            engine.connections.status().storage,
            crate::connection::LinkStatus::Disconnected
        );
    }

    fn sqlx_pool_timeout() -> sqlx::Error {
        sqlx::Error::PoolTimedOut
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_regime_never_evaluates() {
        let classified = Arc::new(AtomicUsize::new(0));
        let counter = classified.clone();
        let mut classifier = MockClassifier::new();
        classifier.expect_classify_regime().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RegimeState::Neutral)
        });
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().never();

        let (engine, tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, true),
            connections(source_with_bars(), MockStore::new()),
            evaluator,
            saturday_noon(),
        );
        let mut engine = engine.with_regime_classifier(Box::new(classifier));

        let handle = tokio::spawn(async move {
            engine.run_until_shutdown(None).await;
            engine
        });

        // Cycles at 0, 60, ..., 300 s.
        time::sleep(Duration::from_secs(330)).await;
        tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        assert_eq!(classified.load(Ordering::SeqCst), 6);
        assert_eq!(engine.state(), EngineState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_spaced_and_gate_evaluation() {
        let start = Instant::now();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let recorded = attempts.clone();
        let store: Arc<dyn TradeStore> = Arc::new(MockStore::new());

        // Storage is down for the first three attempts.
        let mut st = MockStorageConn::new();
        st.expect_connect().returning(move || {
            let mut attempts = recorded.lock().unwrap();
            attempts.push(Instant::now());
            if attempts.len() <= 3 {
                Err(ConnectionError::Connectivity("database is locked".to_string()))
            } else {
                Ok(store.clone())
            }
        });
        let source: Arc<dyn MarketDataSource> = Arc::new(source_with_bars());
        let mut md = MockMarketDataConn::new();
        md.expect_connect().times(1).returning(move || Ok(source.clone()));
        let connections =
            ConnectionManager::new("X:BTCUSD", Box::new(md), Box::new(st), Duration::from_secs(5));

        let evaluated = Arc::new(Mutex::new(Vec::new()));
        let seen = evaluated.clone();
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().returning(move |_| {
            seen.lock().unwrap().push(Instant::now());
            Ok(None)
        });

        let (mut engine, tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections,
            evaluator,
            monday_afternoon(),
        );
        let (sup_tx, mut sup_rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            engine.run_until_shutdown(Some(&sup_tx)).await;
            engine
        });

        // Failed attempts at 0, 300, 600; connected at 900; cycles at 900 and 960.
        time::sleep(Duration::from_secs(990)).await;
        tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        let attempts: Vec<u64> = attempts
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - start).as_secs())
            .collect();
        assert_eq!(attempts, vec![0, 300, 600, 900]);

        let evaluated: Vec<u64> = evaluated
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - start).as_secs())
            .collect();
        assert_eq!(evaluated, vec![900, 960]);
        assert_eq!(engine.state(), EngineState::Connected);

        let mut heartbeats = 0;
        while let Ok(msg) = sup_rx.try_recv() {
            if matches!(msg, ControlMessage::Heartbeat(_)) {
                heartbeats += 1;
            }
        }
        assert_eq!(heartbeats, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycles_do_not_stop_the_loop() {
        let mut evaluator = MockEvaluator::new();
        evaluator
            .expect_evaluate()
            .times(3)
            .returning(|_| Err(EvaluatorError::Failed("model exploded".to_string())));

        let (mut engine, tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections(source_with_bars(), MockStore::new()),
            evaluator,
            monday_afternoon(),
        );
        let (sup_tx, mut sup_rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            engine.run_until_shutdown(Some(&sup_tx)).await;
        });

        time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let mut errors = 0;
        while let Ok(msg) = sup_rx.try_recv() {
            if let ControlMessage::Error(_, cause) = msg {
                assert!(cause.contains("model exploded"));
                errors += 1;
            }
        }
        assert_eq!(errors, 3);
    }

    struct SlowStore {
        rows: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TradeStore for SlowStore {
        async fn create_table_if_absent(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn insert(&self, _record: &NewTradeLog) -> Result<RecordId, StorageError> {
            time::sleep(Duration::from_secs(5)).await;
            Ok(self.rows.fetch_add(1, Ordering::SeqCst) as RecordId + 1)
        }

        async fn ping(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_the_running_write_finish() {
        let rows = Arc::new(AtomicUsize::new(0));
        let store: Arc<dyn TradeStore> = Arc::new(SlowStore { rows: rows.clone() });
        let source: Arc<dyn MarketDataSource> = Arc::new(source_with_bars());

        let mut md = MockMarketDataConn::new();
        md.expect_connect().returning(move || Ok(source.clone()));
        let mut st = MockStorageConn::new();
        st.expect_connect().returning(move || Ok(store.clone()));
        let connections =
            ConnectionManager::new("X:BTCUSD", Box::new(md), Box::new(st), Duration::from_secs(5));

        let mut evaluator = MockEvaluator::new();
        evaluator
            .expect_evaluate()
            .times(1)
            .returning(|_| Ok(Some(long_signal("X:BTCUSD"))));

        let (mut engine, tx) = engine_for(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            connections,
            evaluator,
            monday_afternoon(),
        );
        let handle = tokio::spawn(async move {
            engine.run_until_shutdown(None).await;
            engine
        });

        // Shutdown lands while the insert is still in flight.
        time::sleep(Duration::from_secs(2)).await;
        tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        assert_eq!(rows.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), EngineState::Connected);
    }

    struct PanickingEvaluator {
        calls: Arc<AtomicUsize>,
    }

    impl SignalEvaluator for PanickingEvaluator {
        fn evaluate(&self, _state: &MarketState) -> Result<Option<TradeSignal>, EvaluatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("index out of bounds");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_evaluator_only_fails_its_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);
        let mut engine = Engine::new(
            &instrument("X:BTCUSD", SchedulePolicy::AlwaysOpen, false),
            settings(),
            connections(source_with_bars(), MockStore::new()),
            Box::new(PanickingEvaluator { calls: calls.clone() }),
            rx,
        )
        .with_clock(Arc::new(FixedClock(monday_afternoon())));

        let (sup_tx, mut sup_rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            engine.run_until_shutdown(Some(&sup_tx)).await;
        });

        time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let mut panics = 0;
        while let Ok(msg) = sup_rx.try_recv() {
            if let ControlMessage::Error(_, cause) = msg {
                assert!(cause.contains("index out of bounds"));
                panics += 1;
            }
        }
        assert_eq!(panics, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_reconnect_delay() {
        let mut md = MockMarketDataConn::new();
        md.expect_connect()
            .times(1)
            .returning(|| Err(ConnectionError::Config("POLYGON_API_KEY is not set".to_string())));
        let mut st = MockStorageConn::new();
        st.expect_connect().times(1).returning(|| Ok(Arc::new(MockStore::new()) as Arc<dyn TradeStore>));
        let connections =
            ConnectionManager::new("I:NDX", Box::new(md), Box::new(st), Duration::from_secs(5));

        let (mut engine, tx) = engine_for(
            &instrument("I:NDX", session(), false),
            connections,
            MockEvaluator::new(),
            monday_afternoon(),
        );
        let handle = tokio::spawn(async move {
            engine.run_until_shutdown(None).await;
            engine
        });

        let started = Instant::now();
        time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        let engine = handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(300));
        assert_eq!(engine.state(), EngineState::Disconnected);
    }
}
