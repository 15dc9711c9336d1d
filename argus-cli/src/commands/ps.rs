//! Tracked unit listing

use anyhow::{Context, Result};
use argus_core::Layout;
use argus_core::domain::process::ProcessRecord;
use chrono::Utc;
use colored::*;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::io;
use std::path::Path;
use std::time::Duration;

/// List units recorded in the orchestrator's tracking file
pub fn list_units(layout: &Layout) -> Result<()> {
    let path = layout.process_file();
    let records = read_records(&path)?;

    if records.is_empty() {
        println!("{}", "No tracked units.".yellow());
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{}",
        format!("{:<8} {:<20} {:<8} {:<10} {}", "PID", "WORKFLOW", "PRIORITY", "AGE", "STATE").bold()
    );
    for record in &records {
        let state = if is_alive(record.pid) {
            "running".green()
        } else {
            "exited".dimmed()
        };
        println!(
            "{:<8} {:<20} {:<8} {:<10} {}",
            record.pid,
            record.workflow,
            record.priority.to_string(),
            format_age(record.elapsed(now)),
            state
        );
    }

    Ok(())
}

/// Records of the tracking file; a missing file has none
fn read_records(path: &Path) -> Result<Vec<ProcessRecord>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| line.parse::<ProcessRecord>().ok())
        .collect())
}

fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Renders an age as `2h05m`, `12m` or `40s`
fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match (secs / 3600, (secs % 3600) / 60) {
        (0, 0) => format!("{}s", secs),
        (0, m) => format!("{}m", m),
        (h, m) => format!("{}h{:02}m", h, m),
    }
}
