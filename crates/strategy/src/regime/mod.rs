pub mod ema_trend;

pub use ema_trend::EmaTrendClassifier;
