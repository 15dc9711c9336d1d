//! Seen-findings history

use anyhow::{Context, Result};
use argus_core::Layout;
use colored::*;
use std::io;
use std::path::Path;

/// Show what a workflow has already reported for a target file
pub fn show_history(layout: &Layout, workflow: &str, target: &str, show: bool) -> Result<()> {
    let target = target.strip_suffix(".txt").unwrap_or(target);
    let path = layout.result_file(workflow, target);
    let findings = read_findings(&path)?;

    if findings.is_empty() {
        println!(
            "{}",
            format!("No findings recorded for {} / {}.", workflow, target).yellow()
        );
        return Ok(());
    }

    if show {
        for finding in &findings {
            println!("{}", finding);
        }
    } else {
        println!(
            "{} / {}: {} findings ({})",
            workflow.bold(),
            target,
            findings.len(),
            path.display().to_string().dimmed()
        );
    }

    Ok(())
}

/// Recorded findings in first-seen order; a missing partition has none
fn read_findings(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
