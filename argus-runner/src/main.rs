//! Argus Runner
//!
//! One background unit of work. The orchestrator launches
//! `argus-runner run --workflow <name>` for every admitted workflow; the
//! runner executes that workflow's pipeline against every active target
//! file and reports what is new.
//!
//! Architecture:
//! - Pipeline: external tool stages with timeouts and fail-soft semantics
//! - Store/Reconciler: append-only history and novelty detection
//! - Notify: templated messages delivered with bounded retries
//!
//! Exit codes: 0 on completion, 1 on a missing tool, missing configuration
//! or exhausted notification retries.

mod config;
mod context;
mod error;
mod execution;
mod notify;
mod pipeline;
mod reconcile;
mod store;
mod tools;

use anyhow::{Context, Result};
use argus_core::domain::notification::NotificationRequest;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::execution::WorkflowRunner;
use crate::notify::{CommandTransport, Credentials, NotificationDispatcher, TemplateStore};
use crate::pipeline::{CommandRunner, HttpFetcher, ToolPipeline};

#[derive(Parser)]
#[command(name = "argus-runner")]
#[command(about = "Runs one Argus workflow and reports new findings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow against every active target file
    Run {
        /// Workflow name
        #[arg(short, long)]
        workflow: String,
    },

    /// Send a notification for an existing findings file
    Notify {
        /// Subject line
        #[arg(short, long)]
        subject: String,

        /// File holding the findings, one per line
        #[arg(short, long)]
        body_file: PathBuf,

        /// Template identifier
        #[arg(short, long)]
        template: Option<String>,

        /// Workflow name exposed to the template
        #[arg(long, default_value = "manual")]
        workflow: String,

        /// Target file name exposed to the template
        #[arg(long, default_value = "-")]
        target: String,

        /// Severity label exposed to the template
        #[arg(long)]
        severity: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argus_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { workflow } => run_workflow(&workflow).await,
        Commands::Notify {
            subject,
            body_file,
            template,
            workflow,
            target,
            severity,
        } => {
            let findings = count_lines(&body_file);
            let request = NotificationRequest {
                subject,
                body_path: body_file,
                template,
                workflow,
                target,
                severity,
                findings,
            };
            notify(&request).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads and validates configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Invalid runner configuration")?;
    config.validate().context("Invalid runner configuration")?;
    Ok(config)
}

fn build_dispatcher(config: &Config) -> Result<NotificationDispatcher> {
    let credentials = Credentials::discover(config.credentials_file.as_deref())?;
    let transport = CommandTransport::new(&config.mailer, credentials)?;
    Ok(NotificationDispatcher::new(
        Arc::new(transport),
        TemplateStore::new(&config.layout.templates_dir),
        config.retry.clone(),
    ))
}

async fn run_workflow(name: &str) -> Result<()> {
    let config = load_config()?;

    let workflow = argus_lua::load_workflow(&config.layout.workflows_dir, name)
        .with_context(|| format!("Failed to load workflow '{}'", name))?;
    tools::ensure_tools(&workflow)?;
    let dispatcher = build_dispatcher(&config)?;

    let pipeline = ToolPipeline::new(
        Arc::new(CommandRunner),
        Arc::new(HttpFetcher::new().context("Failed to build HTTP client")?),
    );
    let runner = WorkflowRunner::new(config.layout.clone(), config.keep_runs, pipeline, dispatcher);

    info!("Starting workflow '{}' (pid {})", workflow.name, std::process::id());
    let summary = runner.run(&workflow).await?;

    let failures = summary.delivery_failures();
    if failures > 0 {
        anyhow::bail!(
            "{} notification(s) for workflow '{}' could not be delivered",
            failures,
            workflow.name
        );
    }

    info!(
        "Workflow '{}' completed: {} target file(s), {} new finding(s)",
        workflow.name,
        summary.targets.len(),
        summary.targets.iter().map(|t| t.novel).sum::<usize>()
    );
    Ok(())
}

async fn notify(request: &NotificationRequest) -> Result<()> {
    let config = load_config()?;
    let dispatcher = build_dispatcher(&config)?;

    let report = dispatcher.send(request).await?;
    info!("Notification sent after {} attempt(s)", report.attempts);
    Ok(())
}

fn count_lines(path: &std::path::Path) -> usize {
    std::fs::read_to_string(path)
        .map(|body| body.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}
