use common::models::{Bar, MarketState, RegimeState, TradeSignal};

use crate::error::EvaluatorError;

/// Produces a trade signal, if any, from the latest market state.
/// Implementations must be pure: same state in, same answer out.
pub trait SignalEvaluator: Send + Sync {
    fn evaluate(&self, state: &MarketState) -> Result<Option<TradeSignal>, EvaluatorError>;
}

/// Classifies recent bars (oldest first) into a trend regime. Regime-aware
/// engines only call [`SignalEvaluator::evaluate`] on Bull or Bear.
pub trait RegimeClassifier: Send + Sync {
    fn classify_regime(&self, recent_bars: &[Bar]) -> Result<RegimeState, EvaluatorError>;
}
