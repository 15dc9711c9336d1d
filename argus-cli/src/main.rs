//! Argus CLI
//!
//! Read-only operator view of an Argus home: workflow definitions, target
//! files, units tracked by the orchestrator and previously seen findings.

mod commands;

use anyhow::Result;
use argus_core::Layout;
use clap::Parser;
use commands::{Commands, handle_command};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "Argus recon scheduler CLI", long_about = None)]
struct Cli {
    /// Argus home directory (default: ARGUS_HOME and its overrides)
    #[arg(long)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let layout = match cli.home {
        Some(home) => Layout::new(home),
        None => Layout::from_env(),
    };

    handle_command(cli.command, &layout)
}
