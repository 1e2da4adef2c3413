use common::models::{Bar, MarketState, RegimeState, TradeSignal};

use crate::error::EvaluatorError;
use crate::evaluator::{RegimeClassifier, SignalEvaluator};

/// Bring-up evaluator: never produces a signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignalEvaluator;

impl SignalEvaluator for NoSignalEvaluator {
    fn evaluate(&self, _state: &MarketState) -> Result<Option<TradeSignal>, EvaluatorError> {
        Ok(None)
    }
}

/// Bring-up classifier: always reports a choppy market.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralRegime;

impl RegimeClassifier for NeutralRegime {
    fn classify_regime(&self, _recent_bars: &[Bar]) -> Result<RegimeState, EvaluatorError> {
        Ok(RegimeState::Neutral)
    }
}
