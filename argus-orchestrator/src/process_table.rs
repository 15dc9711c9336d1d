//! Process table
//!
//! The orchestrator is the only writer of the tracking file. Launches are
//! appended as `pid:workflow:timestamp:priority` lines; every sweep rewrites
//! the file with only the units still tracked.

use argus_core::domain::process::ProcessRecord;
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::unit::UnitHandle;

struct TrackedUnit {
    record: ProcessRecord,
    handle: Box<dyn UnitHandle>,
}

/// Units removed by a sweep
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reaped: Vec<ProcessRecord>,
    pub terminated: Vec<ProcessRecord>,
}

pub struct ProcessTable {
    path: PathBuf,
    units: Vec<TrackedUnit>,
}

impl ProcessTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            units: Vec::new(),
        }
    }

    /// Loads the tracking file, keeping records `adopt` can still observe
    pub fn restore<F>(path: &Path, adopt: F) -> io::Result<Self>
    where
        F: Fn(u32) -> Option<Box<dyn UnitHandle>>,
    {
        let mut table = Self::new(path);

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(table),
            Err(e) => return Err(e),
        };

        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match line.parse::<ProcessRecord>() {
                Ok(record) => match adopt(record.pid) {
                    Some(handle) => {
                        info!(
                            "Adopted running unit {} (pid {})",
                            record.workflow, record.pid
                        );
                        table.units.push(TrackedUnit { record, handle });
                    }
                    None => debug!("Dropping exited unit {} (pid {})", record.workflow, record.pid),
                },
                Err(e) => warn!("Skipping tracking entry: {}", e),
            }
        }

        table.persist()?;
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.units.iter().map(|u| &u.record)
    }

    /// Starts tracking a launched unit
    pub fn track(&mut self, record: ProcessRecord, handle: Box<dyn UnitHandle>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record)?;

        self.units.push(TrackedUnit { record, handle });
        Ok(())
    }

    /// Whether a unit of this workflow is still running
    pub fn has_live(&mut self, workflow: &str) -> bool {
        self.units
            .iter_mut()
            .any(|u| u.record.workflow == workflow && !u.handle.has_exited())
    }

    /// Drops exited units and terminates overdue ones
    ///
    /// High-priority units are never terminated by a sweep.
    pub fn sweep(&mut self, now: DateTime<Utc>, max_runtime: Duration) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut kept = Vec::with_capacity(self.units.len());

        for mut unit in self.units.drain(..) {
            if unit.handle.has_exited() {
                debug!(
                    "Unit {} (pid {}) has exited",
                    unit.record.workflow, unit.record.pid
                );
                report.reaped.push(unit.record);
            } else if unit.record.is_overdue(now, max_runtime) {
                warn!(
                    "Terminating stuck unit {} (pid {}) after {:?}",
                    unit.record.workflow,
                    unit.record.pid,
                    unit.record.elapsed(now)
                );
                if let Err(e) = unit.handle.terminate() {
                    warn!("{:#}", e);
                }
                report.terminated.push(unit.record);
            } else {
                kept.push(unit);
            }
        }

        self.units = kept;
        self.persist()?;
        Ok(report)
    }

    /// Sends a termination request to every tracked unit
    ///
    /// Does not wait for the units to exit.
    pub fn terminate_all(&mut self) -> usize {
        let mut signalled = 0;
        for unit in self.units.iter_mut() {
            if unit.handle.has_exited() {
                continue;
            }
            match unit.handle.terminate() {
                Ok(()) => {
                    info!(
                        "Sent termination to {} (pid {})",
                        unit.record.workflow,
                        unit.handle.pid()
                    );
                    signalled += 1;
                }
                Err(e) => warn!("{:#}", e),
            }
        }
        signalled
    }

    fn persist(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = String::new();
        for unit in &self.units {
            contents.push_str(&unit.record.to_string());
            contents.push('\n');
        }
        let tmp = self.path.with_extension("log.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use argus_core::domain::process::MAX_RUNTIME;
    use argus_core::domain::workflow::Priority;
    use chrono::TimeDelta;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Shared view of a fake unit's state
    #[derive(Debug, Default)]
    pub struct FakeUnitState {
        pub exited: bool,
        pub terminated: bool,
    }

    pub struct FakeUnit {
        pub pid: u32,
        pub state: Arc<Mutex<FakeUnitState>>,
    }

    impl FakeUnit {
        pub fn new(pid: u32) -> (Box<dyn UnitHandle>, Arc<Mutex<FakeUnitState>>) {
            let state = Arc::new(Mutex::new(FakeUnitState::default()));
            (
                Box::new(FakeUnit {
                    pid,
                    state: state.clone(),
                }),
                state,
            )
        }
    }

    impl UnitHandle for FakeUnit {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn has_exited(&mut self) -> bool {
            self.state.lock().unwrap().exited
        }

        fn terminate(&mut self) -> anyhow::Result<()> {
            self.state.lock().unwrap().terminated = true;
            Ok(())
        }
    }

    fn record(pid: u32, workflow: &str, started: DateTime<Utc>, priority: Priority) -> ProcessRecord {
        ProcessRecord::new(pid, workflow, started, priority)
    }

    #[test]
    fn test_sweep_terminates_stuck_normal_units_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processes.log");
        let mut table = ProcessTable::new(&path);
        let now = Utc::now();
        let launched = now - TimeDelta::hours(7);

        let (normal, normal_state) = FakeUnit::new(100);
        let (high, high_state) = FakeUnit::new(200);
        table
            .track(record(100, "ports", launched, Priority::Normal), normal)
            .unwrap();
        table
            .track(record(200, "vulns", launched, Priority::High), high)
            .unwrap();

        let report = table.sweep(now, MAX_RUNTIME).unwrap();

        assert_eq!(report.terminated.len(), 1);
        assert_eq!(report.terminated[0].pid, 100);
        assert!(normal_state.lock().unwrap().terminated);
        assert!(!high_state.lock().unwrap().terminated);
        assert_eq!(table.len(), 1);
        assert_eq!(table.records().next().unwrap().workflow, "vulns");

        let persisted = std::fs::read_to_string(&path).unwrap();
        assert!(persisted.starts_with("200:vulns:"));
        assert_eq!(persisted.lines().count(), 1);
    }

    #[test]
    fn test_sweep_keeps_young_units_and_reaps_exited() {
        let dir = TempDir::new().unwrap();
        let mut table = ProcessTable::new(dir.path().join("processes.log"));
        let now = Utc::now();

        let (young, young_state) = FakeUnit::new(1);
        let (done, done_state) = FakeUnit::new(2);
        table
            .track(record(1, "a", now - TimeDelta::hours(5), Priority::Normal), young)
            .unwrap();
        table
            .track(record(2, "b", now - TimeDelta::hours(1), Priority::Normal), done)
            .unwrap();
        done_state.lock().unwrap().exited = true;

        let report = table.sweep(now, MAX_RUNTIME).unwrap();

        assert_eq!(report.reaped.len(), 1);
        assert_eq!(report.reaped[0].workflow, "b");
        assert!(report.terminated.is_empty());
        assert!(!young_state.lock().unwrap().terminated);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_has_live_and_terminate_all() {
        let dir = TempDir::new().unwrap();
        let mut table = ProcessTable::new(dir.path().join("processes.log"));
        let now = Utc::now();

        let (a, a_state) = FakeUnit::new(1);
        let (b, b_state) = FakeUnit::new(2);
        table.track(record(1, "a", now, Priority::Normal), a).unwrap();
        table.track(record(2, "b", now, Priority::High), b).unwrap();
        b_state.lock().unwrap().exited = true;

        assert!(table.has_live("a"));
        assert!(!table.has_live("b"));
        assert!(!table.has_live("c"));

        assert_eq!(table.terminate_all(), 1);
        assert!(a_state.lock().unwrap().terminated);
        assert!(!b_state.lock().unwrap().terminated);
    }

    #[test]
    fn test_restore_prunes_dead_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processes.log");
        std::fs::write(
            &path,
            "10:ports:1700000000:normal\ngarbage\n20:vulns:1700000100:high\n",
        )
        .unwrap();

        let table = ProcessTable::restore(&path, |pid| {
            (pid == 20).then(|| FakeUnit::new(pid).0)
        })
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.records().next().unwrap().workflow, "vulns");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "20:vulns:1700000100:high\n"
        );
    }

    #[test]
    fn test_restore_missing_file() {
        let dir = TempDir::new().unwrap();
        let table = ProcessTable::restore(&dir.path().join("none.log"), |_| None).unwrap();
        assert!(table.is_empty());
    }
}
