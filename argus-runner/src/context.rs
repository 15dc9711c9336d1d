//! Run context
//!
//! Per-invocation state for one (workflow, target file) pipeline run:
//! - A second-resolution timestamp identifier
//! - A scratch directory under `runs/YYYY/MM/`
//! - Paths of every artifact the run produces
//!
//! A context is owned by exactly one run and never shared.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Format of run identifiers, also used in directory names
pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Ephemeral state of one pipeline run
#[derive(Debug)]
pub struct RunContext {
    id: String,
    dir: PathBuf,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RunContext {
    /// Creates the scratch directory for a run
    ///
    /// Two runs starting in the same second get distinct directories: the
    /// second one is suffixed with `-1`, the next with `-2`, and so on.
    pub fn create(
        runs_dir: &Path,
        workflow: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> io::Result<Self> {
        let timestamp = now.format(RUN_ID_FORMAT).to_string();
        let parent = runs_dir
            .join(now.format("%Y").to_string())
            .join(now.format("%m").to_string());
        std::fs::create_dir_all(&parent)?;

        let base = format!("{}_{}_{}", timestamp, workflow, target);
        let mut suffix = 0u32;
        loop {
            let (id, name) = if suffix == 0 {
                (timestamp.clone(), base.clone())
            } else {
                (
                    format!("{}-{}", timestamp, suffix),
                    format!("{}-{}", base, suffix),
                )
            };
            let dir = parent.join(name);

            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    debug!("Created run directory {}", dir.display());
                    return Ok(Self {
                        id,
                        dir,
                        started_at: now,
                        started: Instant::now(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Input list handed to stage `index`
    pub fn stage_input(&self, index: usize, stage: &str) -> PathBuf {
        self.dir.join(format!("{:02}_{}.in", index + 1, stage))
    }

    /// Raw stdout captured from stage `index`
    pub fn stage_output(&self, index: usize, stage: &str) -> PathBuf {
        self.dir.join(format!("{:02}_{}.out", index + 1, stage))
    }

    /// Normalized, intra-run deduplicated pipeline output
    pub fn findings_file(&self) -> PathBuf {
        self.dir.join("findings.txt")
    }

    /// Lines not seen in any previous run
    pub fn new_findings_file(&self) -> PathBuf {
        self.dir.join("new.txt")
    }

    /// Rendered notification body
    pub fn message_file(&self) -> PathBuf {
        self.dir.join("message.txt")
    }

    pub fn stats_file(&self) -> PathBuf {
        self.dir.join("stats.json")
    }

    /// Ends the run, removing its directory unless it is retained for audit
    pub fn finish(self, keep: bool) -> io::Result<()> {
        if keep {
            debug!("Keeping run directory {}", self.dir.display());
            return Ok(());
        }
        std::fs::remove_dir_all(&self.dir)
    }
}
