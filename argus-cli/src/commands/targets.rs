//! Target file listing

use anyhow::{Context, Result};
use argus_core::Layout;
use argus_core::domain::target::{self, TargetFile, TargetStatus};
use colored::*;
use std::path::Path;

/// One row of the target listing
struct TargetRow {
    name: String,
    status: TargetStatus,
    /// Target count, only read for files the runner would pick up
    targets: Option<usize>,
}

/// List the files of the targets directory and their status
pub fn list_targets(layout: &Layout) -> Result<()> {
    let rows = collect_targets(&layout.targets_dir)?;

    if rows.is_empty() {
        println!(
            "{}",
            format!("No target files in {}.", layout.targets_dir.display()).yellow()
        );
        return Ok(());
    }

    for row in &rows {
        let count = row
            .targets
            .map(|n| format!("{} targets", n))
            .unwrap_or_default();
        println!(
            "  {:<10} {:<32} {}",
            colorize_status(row.status),
            row.name,
            count.dimmed()
        );
    }

    Ok(())
}

fn collect_targets(dir: &Path) -> Result<Vec<TargetRow>> {
    let files = target::discover(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut rows = Vec::with_capacity(files.len());
    for (path, status) in files {
        let targets = match status {
            TargetStatus::Active => Some(TargetFile::load(&path)?.targets.len()),
            TargetStatus::Disabled | TargetStatus::Ignored => None,
        };
        rows.push(TargetRow {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            status,
            targets,
        });
    }
    Ok(rows)
}

/// Colorize target status for display
fn colorize_status(status: TargetStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        TargetStatus::Active => status_str.green(),
        TargetStatus::Disabled => status_str.yellow(),
        TargetStatus::Ignored => status_str.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_targets() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("urls_acme.txt"), "acme.com\n# note\n\nshop.acme.com\n").unwrap();
        std::fs::write(dir.path().join("_urls_old.txt"), "old.com\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "hello\n").unwrap();

        let rows = collect_targets(dir.path()).unwrap();
        let summary: Vec<(&str, TargetStatus, Option<usize>)> = rows
            .iter()
            .map(|r| (r.name.as_str(), r.status, r.targets))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("_urls_old.txt", TargetStatus::Disabled, None),
                ("notes.md", TargetStatus::Ignored, None),
                ("urls_acme.txt", TargetStatus::Active, Some(2)),
            ]
        );
    }
}
