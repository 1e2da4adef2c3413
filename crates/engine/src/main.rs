use std::sync::Arc;

use dotenvy::dotenv;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use common::logger;
use engine::actors::{Actor, Supervisor};
use engine::bootstrap::build_engine;
use engine::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();
    debug!("System starting up...");

    let app = Arc::new(AppConfig::from_env());
    for (key, e) in &app.rejected {
        error!("Instrument {} skipped: {}", key, e);
    }
    if app.instruments.is_empty() {
        anyhow::bail!("no instrument could be configured");
    }
    if app.database_url.is_none() {
        warn!("DATABASE_URL is not set, engines will stay disconnected from storage");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let settings = app.settings;
    let stale_after = settings.reconnect_delay + settings.cadence + settings.io_timeout * 4;
    let mut supervisor = Supervisor::new(shutdown_rx.clone()).with_stale_after(stale_after);

    for instrument in &app.instruments {
        info!(
            "Registering {} ({}, model {})",
            instrument.key, instrument.symbol, instrument.model_version
        );
        let app_for_engine = app.clone();
        let instrument = instrument.clone();
        let rx = shutdown_rx.clone();
        supervisor.register_actor(
            instrument.key.clone(),
            Box::new(move || -> Box<dyn Actor> {
                Box::new(build_engine(&app_for_engine, &instrument, rx.clone()))
            }),
        );
    }

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, letting running cycles finish");
        let _ = shutdown_tx.send(true);
    });

    supervisor.start().await;
    info!("All engines stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("SIGTERM handler unavailable: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C, stop the process with SIGKILL: {}", e);
        std::future::pending::<()>().await;
    }
}
