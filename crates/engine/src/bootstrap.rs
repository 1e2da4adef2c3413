use tokio::sync::watch;

use strategy::{EmaTrendClassifier, NeutralRegime, NoSignalEvaluator, RegimeClassifier};

use crate::config::{AppConfig, ClassifierKind, InstrumentConfig};
use crate::connection::ConnectionManager;
use crate::connectors::{PolygonConnector, SqliteConnector};
use crate::engine_loop::Engine;

pub fn regime_classifier(kind: ClassifierKind) -> Box<dyn RegimeClassifier> {
    match kind {
        ClassifierKind::Neutral => Box::new(NeutralRegime),
        ClassifierKind::EmaTrend => Box::new(EmaTrendClassifier::default()),
    }
}

/// Wires a production engine for one instrument: Polygon for bars, the
/// shared SQLite trade log for signals.
pub fn build_engine(
    app: &AppConfig,
    instrument: &InstrumentConfig,
    shutdown: watch::Receiver<bool>,
) -> Engine {
    let timeout = app.settings.io_timeout;
    let market_data = PolygonConnector::new(
        instrument.api_key.clone(),
        instrument.api_key_var.as_str(),
        app.polygon_base_url.as_str(),
        timeout,
    );
    let storage = SqliteConnector::new(app.database_url.clone(), timeout);
    let connections = ConnectionManager::new(
        instrument.symbol.as_str(),
        Box::new(market_data),
        Box::new(storage),
        timeout,
    );

    let engine = Engine::new(
        instrument,
        app.settings,
        connections,
        Box::new(NoSignalEvaluator),
        shutdown,
    );
    if instrument.regime_aware {
        engine.with_regime_classifier(regime_classifier(instrument.classifier))
    } else {
        engine
    }
}
