//! Argus Orchestrator
//!
//! Long-lived control loop. Once a minute it decides which workflows are
//! due, admits them against host resource pressure and launches each as a
//! background `argus-runner` unit. Launched units are tracked until they
//! exit, are swept as stuck, or the orchestrator shuts down.
//!
//! Architecture:
//! - Guard: pid file keeping a single orchestrator per state directory
//! - Scheduler: cadence gates, admission, launch, sweep and sampling
//! - Process table: tracking file of in-flight units

mod admission;
mod config;
mod guard;
mod launcher;
mod process_table;
mod resources;
mod scheduler;
mod unit;

use anyhow::{Context, Result};
use std::process::ExitCode;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::guard::InstanceGuard;
use crate::launcher::ProcessLauncher;
use crate::process_table::ProcessTable;
use crate::resources::SysinfoProbe;
use crate::scheduler::Scheduler;
use crate::unit::{AdoptedHandle, UnitHandle};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argus_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Argus Orchestrator...");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = load_config()?;
    let layout = config.layout.clone();

    let guard = InstanceGuard::acquire(&layout.pid_file())?;
    info!("Holding pid file {}", layout.pid_file().display());

    let workflows = argus_lua::load_workflows(&layout.workflows_dir)?;
    info!(
        "Loaded {} workflows from {}",
        workflows.len(),
        layout.workflows_dir.display()
    );
    for workflow in &workflows {
        info!(
            "  {} ({}, {} priority, {} stages)",
            workflow.name,
            workflow.cadence,
            workflow.priority,
            workflow.stages.len()
        );
    }

    let processes = ProcessTable::restore(&layout.process_file(), |pid| {
        AdoptedHandle::adopt(pid).map(|h| Box::new(h) as Box<dyn UnitHandle>)
    })
    .with_context(|| format!("Failed to restore {}", layout.process_file().display()))?;
    if !processes.is_empty() {
        let names: Vec<&str> = processes.records().map(|r| r.workflow.as_str()).collect();
        info!(
            "Tracking {} units from a previous run: {}",
            names.len(),
            names.join(", ")
        );
    }

    let launcher = ProcessLauncher::new(config.runner.clone(), layout.unit_log_dir());
    let probe = SysinfoProbe::new(layout.home());
    let mut scheduler = Scheduler::new(
        config,
        workflows,
        processes,
        Box::new(launcher),
        Box::new(probe),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;

    guard.release()?;
    info!("Orchestrator {:?}", scheduler.state());
    Ok(())
}

/// Loads and validates configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Invalid orchestrator configuration")?;
    config
        .validate()
        .context("Invalid orchestrator configuration")?;
    Ok(config)
}

/// Resolves on an interrupt or an external terminate request
async fn wait_for_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
                _ = terminate.recv() => info!("Received terminate request"),
            }
        }
        Err(e) => {
            warn!("Cannot listen for terminate requests: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for interrupts: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
