//! Scheduler process entry point.
//!
//! # Responsibility
//! - Load engine config (optional JSON path as the first argument).
//! - Initialize logging and open the database.
//! - Run the background scheduler until Ctrl-C.

use cultivate_core::{
    init_logging, open_db, EngineConfig, LogNotifier, Scheduler, SchedulerState, SystemClock,
};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("cultivate: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref()).map_err(|err| err.to_string())?;
    init_logging(&config.log_level, &config.log_dir)?;

    let conn = open_db(&config.database_path).map_err(|err| {
        format!(
            "failed to open database `{}`: {err}",
            config.database_path.display()
        )
    })?;
    let scheduler = Arc::new(Scheduler::new(
        conn,
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
        config.scheduler,
        config.tasks,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(SchedulerState::default(), shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| format!("failed to listen for ctrl-c: {err}"))?;
    info!("event=shutdown_requested module=cli status=ok");

    // The receiver may already be gone if the loop exited on its own.
    let _ = shutdown_tx.send(true);
    handle
        .await
        .map_err(|err| format!("scheduler task failed: {err}"))?;
    Ok(())
}
