use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Invalid indicator settings: {0}")]
    Settings(String),
    #[error("Indicator rejected input: {0}")]
    Indicator(#[from] ta::errors::TaError),
    #[error("Evaluator failed: {0}")]
    Failed(String),
}
