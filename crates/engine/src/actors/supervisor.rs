use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::actors::{Actor, ControlMessage};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Spawns every registered actor on its own task and respawns those that
/// die without announcing a shutdown.
pub struct Supervisor {
    actor_factories: HashMap<String, ActorFactory>,
    pulses: HashMap<String, Instant>,
    handles: HashMap<String, JoinHandle<()>>,
    ids: HashMap<Uuid, String>,
    finished: HashSet<String>,
    stale: HashSet<String>,
    shutdown: watch::Receiver<bool>,
    check_interval: Duration,
    stale_after: Duration,
}

impl Supervisor {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            actor_factories: HashMap::new(),
            pulses: HashMap::new(),
            handles: HashMap::new(),
            ids: HashMap::new(),
            finished: HashSet::new(),
            stale: HashSet::new(),
            shutdown,
            check_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(600),
        }
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// How long an actor may go without a heartbeat before it is reported.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn register_actor(&mut self, name: impl Into<String>, factory: ActorFactory) {
        self.actor_factories.insert(name.into(), factory);
    }

    /// Runs until shutdown is requested and every actor has returned, or
    /// until every actor has shut down on its own.
    pub async fn start(&mut self) {
        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);
        let mut shutdown = self.shutdown.clone();
        let mut check_interval = time::interval(self.check_interval);

        let mut names: Vec<String> = self.actor_factories.keys().cloned().collect();
        names.sort();
        for name in names {
            self.spawn_actor(&name, supervisor_tx.clone());
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    info!("Shutdown requested, waiting for {} actor(s)", self.handles.len());
                    break;
                }

                Some(msg) = supervisor_rx.recv() => self.handle_message(msg),

                _ = check_interval.tick() => {
                    while let Ok(msg) = supervisor_rx.try_recv() {
                        self.handle_message(msg);
                    }
                    self.check_actors(&supervisor_tx);
                }
            }

            if self.handles.is_empty() {
                info!("All actors have shut down");
                return;
            }
        }

        for (name, handle) in self.handles.drain() {
            if let Err(e) = handle.await {
                error!("Actor {} did not stop cleanly: {}", name, e);
            }
        }
    }

    fn handle_message(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Heartbeat(id) => {
                if let Some(name) = self.ids.get(&id) {
                    if self.stale.remove(name) {
                        info!("{} is responsive again", name);
                    }
                    self.pulses.insert(name.clone(), Instant::now());
                }
            }
            ControlMessage::Shutdown(id) => {
                if let Some(name) = self.ids.remove(&id) {
                    info!("{} is shutting down gracefully.", name);
                    self.pulses.remove(&name);
                    self.finished.insert(name);
                }
            }
            ControlMessage::Error(id, error_msg) => {
                let name = self.ids.get(&id).map(String::as_str).unwrap_or("unknown actor");
                warn!("Actor {} reported error: {}", name, error_msg);
            }
        }
    }

    fn check_actors(&mut self, supervisor_tx: &mpsc::Sender<ControlMessage>) {
        let stale_before = Instant::now().checked_sub(self.stale_after);
        for (name, &pulse) in &self.pulses {
            if stale_before.is_some_and(|t| pulse < t) && self.stale.insert(name.clone()) {
                warn!("{} is unresponsive! No heartbeat for {:?}", name, self.stale_after);
            }
        }

        let done: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        for name in done {
            self.handles.remove(&name);
            if self.finished.remove(&name) || *self.shutdown.borrow() {
                continue;
            }
            error!("{} stopped unexpectedly, restarting", name);
            self.spawn_actor(&name, supervisor_tx.clone());
        }
    }

    fn spawn_actor(&mut self, name: &str, tx: mpsc::Sender<ControlMessage>) {
        let Some(factory) = self.actor_factories.get(name) else {
            return;
        };
        let mut new_actor = factory();
        let id = new_actor.id();
        let label = name.to_string();

        self.ids.retain(|_, existing| existing.as_str() != name);
        self.ids.insert(id, label.clone());
        self.stale.remove(name);

        let new_actor_handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx).await {
                error!("Actor {} crashed: {}", label, e);
            }
        });
        self.handles.insert(name.to_string(), new_actor_handle);
        self.pulses.insert(name.to_string(), Instant::now());
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
