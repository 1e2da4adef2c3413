pub mod bar;
pub mod market_state;
pub mod regime;
pub mod signal;

pub use bar::Bar;
pub use market_state::MarketState;
pub use regime::RegimeState;
pub use signal::{Direction, TradeSignal, ValidatedSignal, ValidationError};
