pub mod actors;
pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod connectors;
pub mod engine_loop;
pub mod error;
pub mod schedule;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, ClassifierKind, EngineSettings, InstrumentConfig};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus, LinkStatus};
pub use engine_loop::{CycleOutcome, Engine, EngineState};
pub use error::{ConfigError, ConnectionError, CycleError};
pub use schedule::{Clock, SchedulePolicy, SessionWindow, SystemClock, is_open};
