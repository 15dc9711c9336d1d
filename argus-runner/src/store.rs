//! Result store
//!
//! One append-only file per (workflow, target file) pair holding every
//! finding ever observed for that pair, one normalized line each. Lines are
//! never removed.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Root of all result partitions
#[derive(Debug, Clone)]
pub struct ResultStore {
    results_dir: PathBuf,
}

impl ResultStore {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Partition of a (workflow, target file) pair
    pub fn partition(&self, workflow: &str, target: &str) -> Partition {
        Partition {
            path: self
                .results_dir
                .join(workflow)
                .join(format!("{}.txt", target)),
        }
    }
}

/// The previously-seen set of one (workflow, target file) pair
#[derive(Debug, Clone)]
pub struct Partition {
    path: PathBuf,
}

impl Partition {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full membership set; a missing file is an empty set
    pub fn load(&self) -> io::Result<HashSet<String>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };

        Ok(contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Appends lines and flushes them to disk before returning
    pub fn append(&self, lines: &[String]) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut buf = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_all()
    }
}
