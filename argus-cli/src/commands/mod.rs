//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod history;
mod ps;
mod targets;
mod workflows;

use anyhow::Result;
use argus_core::Layout;
use clap::Subcommand;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List workflow definitions
    Workflows,
    /// List target files and their status
    Targets,
    /// Show units tracked by the orchestrator
    Ps,
    /// Show previously seen findings of a workflow for a target file
    History {
        /// Workflow name
        workflow: String,

        /// Target file name, with or without `.txt`
        target: String,

        /// Print every finding instead of the count
        #[arg(long)]
        show: bool,
    },
}

/// Routes the command to the appropriate handler module
pub fn handle_command(command: Commands, layout: &Layout) -> Result<()> {
    match command {
        Commands::Workflows => workflows::list_workflows(layout),
        Commands::Targets => targets::list_targets(layout),
        Commands::Ps => ps::list_units(layout),
        Commands::History {
            workflow,
            target,
            show,
        } => history::show_history(layout, &workflow, &target, show),
    }
}
