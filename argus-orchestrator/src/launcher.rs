//! Background unit launcher
//!
//! Each admitted workflow runs as an independent `argus-runner` process.
//! Normal-priority units run with lowered CPU and I/O priority when
//! `nice`/`ionice` are installed. Output goes to a per-launch log file.

use anyhow::{Context, Result};
use argus_core::domain::workflow::{Priority, WorkflowDescriptor};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::unit::{ChildHandle, UnitHandle};

/// Starts background units
pub trait Launcher: Send + Sync {
    fn launch(&self, workflow: &WorkflowDescriptor, now: DateTime<Utc>) -> Result<Box<dyn UnitHandle>>;
}

/// Launches `argus-runner run --workflow <name>` processes
pub struct ProcessLauncher {
    runner: PathBuf,
    log_dir: PathBuf,
    /// Command prefix applied to normal-priority units
    throttle: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(runner: PathBuf, log_dir: PathBuf) -> Self {
        let mut throttle = Vec::new();
        if let Ok(nice) = which::which("nice") {
            throttle.extend([nice.to_string_lossy().into_owned(), "-n".into(), "10".into()]);
        }
        if let Ok(ionice) = which::which("ionice") {
            throttle.extend([ionice.to_string_lossy().into_owned(), "-c".into(), "3".into()]);
        }
        if throttle.is_empty() {
            debug!("Neither nice nor ionice found, normal units run unthrottled");
        }

        Self {
            runner,
            log_dir,
            throttle,
        }
    }

    /// Full argument vector for a workflow, program first
    fn argv(&self, workflow: &WorkflowDescriptor) -> Vec<String> {
        let mut argv = Vec::new();
        if workflow.priority == Priority::Normal {
            argv.extend(self.throttle.iter().cloned());
        }
        argv.push(self.runner.to_string_lossy().into_owned());
        argv.extend(["run".to_string(), "--workflow".to_string(), workflow.name.clone()]);
        argv
    }

    fn log_path(&self, workflow: &str, now: DateTime<Utc>) -> PathBuf {
        self.log_dir
            .join(format!("{}-{}.log", workflow, now.format("%Y%m%d_%H%M%S")))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, workflow: &WorkflowDescriptor, now: DateTime<Utc>) -> Result<Box<dyn UnitHandle>> {
        std::fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("Failed to create {}", self.log_dir.display()))?;

        let log_path = self.log_path(&workflow.name, now);
        let log = File::options()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open {}", log_path.display()))?;
        let log_err = log.try_clone().context("Failed to duplicate log handle")?;

        let argv = self.argv(workflow);
        let (program, args) = argv
            .split_first()
            .context("Empty launch command")?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .with_context(|| format!("Failed to launch {}", program))?;

        info!(
            "Launched '{}' as pid {} (log: {})",
            workflow.name,
            child.id(),
            log_path.display()
        );
        Ok(Box::new(ChildHandle::new(child)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::domain::workflow::Cadence;
    use chrono::TimeZone;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn workflow(priority: Priority) -> WorkflowDescriptor {
        WorkflowDescriptor {
            name: "ports".to_string(),
            description: None,
            cadence: Cadence::Daily,
            priority,
            stages: vec![],
            subject: None,
            template: None,
            severity: None,
            seed_silently: false,
        }
    }

    fn launcher(runner: &str, log_dir: PathBuf, throttle: &[&str]) -> ProcessLauncher {
        ProcessLauncher {
            runner: PathBuf::from(runner),
            log_dir,
            throttle: throttle.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_priority_hints() {
        let l = launcher("/opt/argus/argus-runner", PathBuf::from("/tmp"), &["nice", "-n", "10"]);

        assert_eq!(
            l.argv(&workflow(Priority::Normal)),
            vec!["nice", "-n", "10", "/opt/argus/argus-runner", "run", "--workflow", "ports"]
        );
        assert_eq!(
            l.argv(&workflow(Priority::High)),
            vec!["/opt/argus/argus-runner", "run", "--workflow", "ports"]
        );
    }

    #[test]
    fn test_launch_writes_log() {
        let dir = TempDir::new().unwrap();
        let l = launcher("echo", dir.path().join("logs"), &[]);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();

        let mut handle = l.launch(&workflow(Priority::High), now).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.has_exited() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        let log = dir.path().join("logs").join("ports-20240501_060000.log");
        assert_eq!(
            std::fs::read_to_string(log).unwrap(),
            "run --workflow ports\n"
        );
    }
}
