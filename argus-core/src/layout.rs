//! On-disk layout
//!
//! Every Argus binary agrees on where targets, results, run artifacts,
//! workflow definitions, templates and orchestrator state live. The layout
//! is rooted at `ARGUS_HOME` and each directory can be overridden on its own.

use std::path::{Path, PathBuf};

/// Directory layout rooted at a home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub home: PathBuf,
    pub targets_dir: PathBuf,
    pub results_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub workflows_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl Layout {
    /// Creates the default layout under `home`
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            targets_dir: home.join("targets"),
            results_dir: home.join("results"),
            runs_dir: home.join("runs"),
            workflows_dir: home.join("workflows"),
            templates_dir: home.join("templates"),
            state_dir: home.join("state"),
            home,
        }
    }

    /// Creates the layout from environment variables
    ///
    /// - ARGUS_HOME (optional, default: current directory)
    /// - ARGUS_TARGETS_DIR, ARGUS_RESULTS_DIR, ARGUS_RUNS_DIR,
    ///   ARGUS_WORKFLOWS_DIR, ARGUS_TEMPLATES_DIR, ARGUS_STATE_DIR (optional)
    pub fn from_env() -> Self {
        let home = std::env::var("ARGUS_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let mut layout = Self::new(home);
        let overrides: [(&str, &mut PathBuf); 6] = [
            ("ARGUS_TARGETS_DIR", &mut layout.targets_dir),
            ("ARGUS_RESULTS_DIR", &mut layout.results_dir),
            ("ARGUS_RUNS_DIR", &mut layout.runs_dir),
            ("ARGUS_WORKFLOWS_DIR", &mut layout.workflows_dir),
            ("ARGUS_TEMPLATES_DIR", &mut layout.templates_dir),
            ("ARGUS_STATE_DIR", &mut layout.state_dir),
        ];
        for (var, dir) in overrides {
            if let Ok(value) = std::env::var(var)
                && !value.is_empty()
            {
                *dir = PathBuf::from(value);
            }
        }
        layout
    }

    /// Result partition for a (workflow, target file) pair
    pub fn result_file(&self, workflow: &str, target: &str) -> PathBuf {
        self.results_dir.join(workflow).join(format!("{}.txt", target))
    }

    /// Singleton guard file of the orchestrator
    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join("argus.pid")
    }

    /// Append-only log of launched background units
    pub fn process_file(&self) -> PathBuf {
        self.state_dir.join("processes.log")
    }

    /// Cadence bookkeeping persisted across orchestrator restarts
    pub fn scheduler_state_file(&self) -> PathBuf {
        self.state_dir.join("scheduler.json")
    }

    /// Directory receiving the output of background units
    pub fn unit_log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Definition file for a workflow name
    pub fn workflow_file(&self, name: &str) -> PathBuf {
        self.workflows_dir.join(format!("{}.lua", name))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(".")
    }
}
