//! Target file domain types
//!
//! Target files live in a single input directory. Their file names act as a
//! tri-state switch: `urls*.txt` is active, `_urls*` is disabled, anything
//! else is ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ACTIVE_PREFIX: &str = "urls";
const DISABLED_PREFIX: &str = "_urls";
const TARGET_EXTENSION: &str = "txt";

/// Prefixes removed from every target line
const STRIPPED_PREFIXES: [&str; 3] = ["*.", "http://", "https://"];

/// Eligibility of a file in the targets directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Active,
    Disabled,
    Ignored,
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetStatus::Active => write!(f, "active"),
            TargetStatus::Disabled => write!(f, "disabled"),
            TargetStatus::Ignored => write!(f, "ignored"),
        }
    }
}

/// Classifies a target file by its name
pub fn classify(path: &Path) -> TargetStatus {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return TargetStatus::Ignored;
    };

    if name.starts_with(DISABLED_PREFIX) {
        return TargetStatus::Disabled;
    }

    let is_txt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == TARGET_EXTENSION);

    if name.starts_with(ACTIVE_PREFIX) && is_txt {
        TargetStatus::Active
    } else {
        TargetStatus::Ignored
    }
}

/// Strips wildcard and scheme prefixes from a target line
///
/// Idempotent: normalizing an already normalized target returns it unchanged.
pub fn normalize_target(line: &str) -> String {
    let mut current = line.trim();
    while let Some(rest) = STRIPPED_PREFIXES
        .iter()
        .find_map(|prefix| current.strip_prefix(prefix))
    {
        current = rest;
    }
    current.to_string()
}

/// Lists every regular file of the targets directory with its status
///
/// Sorted by file name so callers see a stable order.
pub fn discover(dir: &Path) -> io::Result<Vec<(PathBuf, TargetStatus)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let status = classify(&path);
        found.push((path, status));
    }
    found.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(found)
}

/// A named, ordered list of targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFile {
    /// File stem, used to key result partitions and run directories
    pub id: String,
    pub path: PathBuf,
    pub targets: Vec<String>,
}

impl TargetFile {
    /// Reads a target file without modifying it
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        let targets = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        Ok(Self {
            id: target_id(path),
            path: path.to_path_buf(),
            targets,
        })
    }

    /// Normalizes the file in place and returns its normalized targets
    ///
    /// Comment and blank lines are preserved. The file is only rewritten
    /// when normalization changed something.
    pub fn normalize_in_place(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;

        let mut rewritten = String::with_capacity(content.len());
        let mut targets = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                rewritten.push_str(line);
            } else {
                let normalized = normalize_target(trimmed);
                rewritten.push_str(&normalized);
                if !normalized.is_empty() {
                    targets.push(normalized);
                }
            }
            rewritten.push('\n');
        }

        if rewritten != content {
            let tmp = path.with_extension("txt.tmp");
            fs::write(&tmp, &rewritten)?;
            fs::rename(&tmp, path)?;
        }

        Ok(Self {
            id: target_id(path),
            path: path.to_path_buf(),
            targets,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn target_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
