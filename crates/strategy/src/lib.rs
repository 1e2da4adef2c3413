pub mod error;
pub mod evaluator;
pub mod regime;
pub mod stub;

pub use error::EvaluatorError;
pub use evaluator::{RegimeClassifier, SignalEvaluator};
pub use regime::EmaTrendClassifier;
pub use stub::{NeutralRegime, NoSignalEvaluator};
