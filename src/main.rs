//! Appliance Advisor - notification daemon
//!
//! Loads the configuration, opens the history database and runs the hourly
//! and peak-window ticks until Ctrl-C.

use anyhow::Context;
use appliance_advisor_lib::core::Config;
use appliance_advisor_lib::db::{Database, DedupePolicy};
use appliance_advisor_lib::influx::InfluxClient;
use appliance_advisor_lib::push::ExpoGateway;
use appliance_advisor_lib::scheduler::{
    Collaborators, Scheduler, SqliteHistory, StaticDirectory, TickKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional: explicit config file, and `--once` to run a single hourly tick
    let mut config_path: Option<PathBuf> = None;
    let mut once = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            path => config_path = Some(PathBuf::from(path)),
        }
    }

    let config = match &config_path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    log::info!(
        "Loaded config: {} users, peak window {}-{}",
        config.users.len(),
        config.schedule.peak_start,
        config.schedule.peak_end
    );

    let db_path = config.database_path().context("No location for the history database")?;
    let db = Database::new(&db_path)
        .with_context(|| format!("Failed to open history database at {}", db_path.display()))?;
    log::info!("History database {} holds {} entries", db_path.display(), db.count()?);
    let db = Arc::new(Mutex::new(db));

    let influx = InfluxClient::new(&config.influx);
    let io = Collaborators {
        users: StaticDirectory::new(config.users.clone()),
        samples: influx.clone(),
        conditions: influx,
        history: SqliteHistory::new(db, DedupePolicy::from_schedule(&config.schedule)),
        gateway: ExpoGateway::new(&config.push),
    };
    let scheduler = Scheduler::new(&config, io).context("Invalid scheduler configuration")?;

    if once {
        let report = scheduler.run_tick(TickKind::Hourly).await;
        log::info!("Single tick finished: {:?}", report);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            // Keep the sender alive so the loops keep running
            std::future::pending::<()>().await;
        }
        log::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    log::info!("Appliance Advisor stopped");
    Ok(())
}
