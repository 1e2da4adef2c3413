use ta::indicators::{AverageTrueRange, ExponentialMovingAverage};
use ta::{DataItem, Next};
use tracing::debug;

use common::models::{Bar, RegimeState};

use crate::error::EvaluatorError;
use crate::evaluator::RegimeClassifier;

/// Trend filter built from a fast/slow EMA pair on closes, scaled by ATR.
///
/// The market is trending when the EMA spread exceeds `atr_multiple` times
/// the current ATR: Bull above, Bear below. Anything in between is Neutral,
/// as is a history shorter than the slow period.
#[derive(Debug, Clone)]
pub struct EmaTrendClassifier {
    fast_period: usize,
    slow_period: usize,
    atr_period: usize,
    atr_multiple: f64,
}

impl EmaTrendClassifier {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        atr_period: usize,
        atr_multiple: f64,
    ) -> Result<Self, EvaluatorError> {
        if fast_period == 0 || atr_period == 0 {
            return Err(EvaluatorError::Settings(
                "periods must be greater than zero".to_string(),
            ));
        }
        if fast_period >= slow_period {
            return Err(EvaluatorError::Settings(format!(
                "fast period ({}) must be shorter than slow period ({})",
                fast_period, slow_period
            )));
        }
        if !atr_multiple.is_finite() || atr_multiple < 0.0 {
            return Err(EvaluatorError::Settings(format!(
                "ATR multiple must be a non-negative number, got {}",
                atr_multiple
            )));
        }

        Ok(Self {
            fast_period,
            slow_period,
            atr_period,
            atr_multiple,
        })
    }

    pub fn min_bars(&self) -> usize {
        self.slow_period
    }
}

impl Default for EmaTrendClassifier {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
            atr_period: 14,
            atr_multiple: 0.5,
        }
    }
}

impl RegimeClassifier for EmaTrendClassifier {
    fn classify_regime(&self, recent_bars: &[Bar]) -> Result<RegimeState, EvaluatorError> {
        if recent_bars.len() < self.min_bars() {
            debug!(
                "Only {} bars, need {} to call a trend",
                recent_bars.len(),
                self.min_bars()
            );
            return Ok(RegimeState::Neutral);
        }

        let mut fast = ExponentialMovingAverage::new(self.fast_period)?;
        let mut slow = ExponentialMovingAverage::new(self.slow_period)?;
        let mut atr = AverageTrueRange::new(self.atr_period)?;

        let (mut fast_val, mut slow_val, mut atr_val) = (0.0, 0.0, 0.0);
        for bar in recent_bars {
            let item = DataItem::builder()
                .open(bar.open)
                .high(bar.high)
                .low(bar.low)
                .close(bar.close)
                .volume(bar.volume)
                .build()?;

            fast_val = fast.next(bar.close);
            slow_val = slow.next(bar.close);
            atr_val = atr.next(&item);
        }

        let spread = fast_val - slow_val;
        let band = self.atr_multiple * atr_val;
        debug!(
            "EMA fast={:.2} slow={:.2} spread={:.2} ATR={:.2}",
            fast_val, slow_val, spread, atr_val
        );

        let regime = if spread > band {
            RegimeState::Bull
        } else if spread < -band {
            RegimeState::Bear
        } else {
            RegimeState::Neutral
        };
        Ok(regime)
    }
}
