//! Control loop
//!
//! One drift-corrected tick per minute. Each tick evaluates the cadence
//! gates, admits and launches due workflows, sweeps stuck units at `:30`
//! and samples resources at `:15`/`:45`. A shutdown request ends the loop
//! and signals every tracked unit without waiting for it.

pub mod cadence;

use argus_core::domain::process::ProcessRecord;
use argus_core::domain::workflow::{Cadence, WorkflowDescriptor};
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::admission::{self, Admission, Pressure};
use crate::config::Config;
use crate::launcher::Launcher;
use crate::process_table::ProcessTable;
use crate::resources::ResourceProbe;
use cadence::{CadenceState, Duties};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Lifecycle of the orchestrator process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Workflows launched and skipped by one tick
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub launched: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Scheduler {
    config: Config,
    workflows: Vec<WorkflowDescriptor>,
    cadence: CadenceState,
    processes: ProcessTable,
    launcher: Box<dyn Launcher>,
    probe: Box<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
    state: Lifecycle,
}

impl Scheduler {
    pub fn new(
        config: Config,
        workflows: Vec<WorkflowDescriptor>,
        processes: ProcessTable,
        launcher: Box<dyn Launcher>,
        probe: Box<dyn ResourceProbe>,
    ) -> Self {
        let cadence = CadenceState::load(&config.layout.scheduler_state_file());
        Self {
            config,
            workflows,
            cadence,
            processes,
            launcher,
            probe,
            clock: Arc::new(SystemClock),
            state: Lifecycle::Starting,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Runs ticks until `shutdown` flips, then shuts down
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        self.state = Lifecycle::Running;
        info!(
            "Scheduler running with {} workflows (daily hour {:02}:00 UTC)",
            self.workflows.len(),
            self.config.daily_hour
        );

        loop {
            let report = self.tick(self.clock.now()).await;
            if !report.launched.is_empty() || !report.skipped.is_empty() {
                info!(
                    "Tick finished: launched [{}], skipped [{}]",
                    report.launched.join(", "),
                    report.skipped.join(", ")
                );
            }

            let wait = until_next_minute(self.clock.now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Performs the duties due at `now`
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let duties = self.cadence.due(now, self.config.daily_hour);
        debug!("Tick at {} with duties {:?}", now.format("%H:%M:%S"), duties);

        if duties.hourly || duties.daily {
            if let Err(e) = self.cadence.save(&self.config.layout.scheduler_state_file()) {
                error!("Failed to persist scheduler state: {}", e);
            }
        }

        let report = self.admit_due(duties, now).await;

        if duties.sweep {
            self.sweep(now);
        }

        if duties.sample {
            self.sample_resources();
        }

        report
    }

    /// Signals every tracked unit and stops
    pub fn shutdown(&mut self) {
        self.state = Lifecycle::ShuttingDown;
        info!("Shutting down, signalling {} tracked units", self.processes.len());

        let signalled = self.processes.terminate_all();
        self.state = Lifecycle::Stopped;
        info!("Shutdown complete ({} units signalled)", signalled);
    }

    async fn admit_due(&mut self, duties: Duties, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let candidates: Vec<WorkflowDescriptor> = self
            .workflows
            .iter()
            .filter(|w| match w.cadence {
                Cadence::Hourly => duties.hourly,
                Cadence::Daily => duties.daily,
            })
            .cloned()
            .collect();
        if candidates.is_empty() {
            return report;
        }

        let pressures = self.current_pressures();

        for workflow in candidates {
            if self.processes.has_live(&workflow.name) {
                info!("Skipping '{}': previous unit still running", workflow.name);
                report.skipped.push(workflow.name);
                continue;
            }

            match admission::decide(workflow.priority, &pressures) {
                Admission::Admit => {}
                Admission::AdmitUnderPressure(p) => warn!(
                    "Admitting high-priority '{}' under pressure: {}",
                    workflow.name,
                    admission::describe(&p)
                ),
                Admission::Skip(p) => {
                    warn!(
                        "Skipping '{}' this cycle: {}",
                        workflow.name,
                        admission::describe(&p)
                    );
                    report.skipped.push(workflow.name);
                    continue;
                }
            }

            if !report.launched.is_empty() && !self.config.launch_stagger.is_zero() {
                tokio::time::sleep(self.config.launch_stagger).await;
            }

            match self.launcher.launch(&workflow, now) {
                Ok(handle) => {
                    let record =
                        ProcessRecord::new(handle.pid(), &workflow.name, now, workflow.priority);
                    if let Err(e) = self.processes.track(record, handle) {
                        error!("Failed to record unit of '{}': {}", workflow.name, e);
                    }
                    report.launched.push(workflow.name);
                }
                Err(e) => {
                    error!("Failed to launch '{}': {:#}", workflow.name, e);
                    report.skipped.push(workflow.name);
                }
            }
        }

        report
    }

    /// Pressures right now; a failed sample counts as no pressure
    fn current_pressures(&self) -> Vec<Pressure> {
        match self.probe.sample() {
            Ok(sample) => self.config.thresholds.pressures(&sample),
            Err(e) => {
                warn!("Resource sampling failed, admitting without checks: {:#}", e);
                Vec::new()
            }
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        match self.processes.sweep(now, self.config.max_runtime) {
            Ok(report) => {
                if !report.reaped.is_empty() || !report.terminated.is_empty() {
                    info!(
                        "Sweep: {} exited, {} terminated, {} still running",
                        report.reaped.len(),
                        report.terminated.len(),
                        self.processes.len()
                    );
                }
            }
            Err(e) => error!("Failed to persist process table after sweep: {}", e),
        }
    }

    fn sample_resources(&self) {
        match self.probe.sample() {
            Ok(sample) => {
                let pressures = self.config.thresholds.pressures(&sample);
                if pressures.is_empty() {
                    debug!(
                        "Resources: load {:.2}, memory {:.1}%, disk {:.1}%",
                        sample.load_one, sample.memory_used_percent, sample.disk_used_percent
                    );
                } else {
                    warn!("Resource pressure: {}", admission::describe(&pressures));
                }
            }
            Err(e) => warn!("Resource sampling failed: {:#}", e),
        }
    }
}

/// Time left until the top of the next minute
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.timestamp_subsec_nanos()));
    Duration::from_secs(60).saturating_sub(into_minute)
}
