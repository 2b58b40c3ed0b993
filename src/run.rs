//! Bot lifecycle: build the service graph, spawn every background worker,
//! wait for Ctrl-C, then drain everything gracefully.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Config, Secrets};
use crate::database::Database;
use crate::dispatch::Dispatcher;
use crate::logger::{self, LogTag};
use crate::notify::TelegramSink;
use crate::services::Services;
use crate::shutdown::ShutdownHandle;
use crate::{diagnostics, discovery, health, intake, maintenance, paths, reanalysis};

pub async fn run_bot() -> Result<()> {
    // Configuration + secrets. A missing Telegram token or unwritable data
    // directory abort startup; everything else degrades at runtime.
    let config = Config::load(&paths::get_config_path()).context("loading config")?;
    let secrets = Secrets::from_env();
    secrets.validate()?;

    if secrets.helius_api_key.is_empty() {
        logger::warning(
            LogTag::System,
            "HELIUS_API_KEY not set - firehose discovery and asset facts degraded",
        );
    }
    if secrets.birdeye_api_key.is_empty() {
        logger::warning(LogTag::System, "BIRDEYE_API_KEY not set - reduced data sources");
    }

    let db = Database::open(&paths::get_database_path()).context("opening database")?;

    let (shutdown_handle, shutdown) = ShutdownHandle::new();
    let services = Services::build(config, secrets, db, shutdown)?;

    // Crash recovery before anything runs: orphaned claims back to the queue
    match services.db.reset_stuck_claims(0) {
        Ok(0) => {}
        Ok(reset) => logger::log(
            LogTag::System,
            "RECOVERED",
            &format!("{} interrupted claims returned to the queue", reset),
        ),
        Err(e) => logger::warning(LogTag::System, &format!("Claim recovery failed: {}", e)),
    }

    let sink = Arc::new(
        TelegramSink::new(&services.secrets.telegram_token)
            .map_err(anyhow::Error::msg)
            .context("building Telegram sink")?,
    );

    logger::log(LogTag::System, "START", "Firing up background workers");
    let mut handles = Vec::new();
    handles.extend(discovery::spawn_all(&services));
    handles.push(tokio::spawn(intake::run(services.clone())));
    handles.push(tokio::spawn(reanalysis::run(services.clone())));
    handles.push(tokio::spawn(reanalysis::run_second_chance(services.clone())));
    handles.push(tokio::spawn(maintenance::run(services.clone())));
    handles.push(tokio::spawn(health::run_decay_loop(
        services.health.clone(),
        services.shutdown.clone(),
    )));
    handles.push(tokio::spawn(diagnostics::run(services.clone())));

    let dispatcher = Dispatcher::new(services.clone(), sink);
    handles.extend(dispatcher.spawn_loops());

    logger::info(
        LogTag::System,
        &format!("{} background tasks running", handles.len()),
    );

    // Park until the operator asks us to stop
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    logger::log(LogTag::System, "SHUTDOWN", "Ctrl-C received, draining tasks");
    shutdown_handle.trigger();

    // Await every task; individual failures are logged, never propagated
    for handle in handles {
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                logger::warning(LogTag::System, &format!("Task ended abnormally: {}", e));
            }
        }
    }

    // Final flush so a restart starts from a clean WAL
    if let Err(e) = services.db.checkpoint() {
        logger::warning(LogTag::System, &format!("Final checkpoint failed: {}", e));
    }

    Ok(())
}
