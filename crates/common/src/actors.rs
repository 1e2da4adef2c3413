use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Messages sent from Actors to the Supervisor
pub enum ControlMessage {
    /// Sent after every completed engine cycle.
    Heartbeat(Uuid),
    /// The actor finished on purpose and must not be restarted.
    Shutdown(Uuid),
    Error(Uuid, String),
}

impl std::fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heartbeat(id) => write!(f, "Heartbeat({})", id),
            Self::Shutdown(id) => write!(f, "Shutdown({})", id),
            Self::Error(id, err) => write!(f, "Error({}, {})", id, err),
        }
    }
}

/// The trait that all restartable services must implement
#[async_trait]
pub trait Actor: Send + Sync {
    /// Human readable label used in supervisor logs (e.g. "btc").
    fn name(&self) -> &str;

    fn id(&self) -> Uuid;

    /// The main loop of the actor.
    /// It should send `ControlMessage::Heartbeat` to the supervisor whenever it makes progress.
    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()>;
}
