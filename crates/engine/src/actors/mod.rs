pub mod supervisor;

pub use common::actors::{Actor, ControlMessage};
pub use supervisor::{ActorFactory, Supervisor};
