//! Admission control
//!
//! Threshold-based and advisory: under pressure a high-priority workflow
//! is still admitted, anything else is skipped for the current cycle.

use argus_core::domain::workflow::Priority;
use std::fmt;

/// One reading of host resources
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// One-minute load average
    pub load_one: f64,
    pub cores: usize,
    pub memory_used_percent: f64,
    pub disk_used_percent: f64,
}

/// Limits above which the host is considered under pressure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Load limit as a multiple of the core count
    pub load_factor: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            load_factor: 0.8,
            memory_percent: 90.0,
            disk_percent: 90.0,
        }
    }
}

/// A threshold exceeded by a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pressure {
    Load { load: f64, limit: f64 },
    Memory { used: f64, limit: f64 },
    Disk { used: f64, limit: f64 },
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pressure::Load { load, limit } => write!(f, "load {:.2} > {:.2}", load, limit),
            Pressure::Memory { used, limit } => write!(f, "memory {:.1}% > {:.0}%", used, limit),
            Pressure::Disk { used, limit } => write!(f, "disk {:.1}% > {:.0}%", used, limit),
        }
    }
}

impl Thresholds {
    /// Every threshold the sample exceeds
    pub fn pressures(&self, sample: &ResourceSample) -> Vec<Pressure> {
        let mut pressures = Vec::new();

        let load_limit = sample.cores.max(1) as f64 * self.load_factor;
        if sample.load_one > load_limit {
            pressures.push(Pressure::Load {
                load: sample.load_one,
                limit: load_limit,
            });
        }
        if sample.memory_used_percent > self.memory_percent {
            pressures.push(Pressure::Memory {
                used: sample.memory_used_percent,
                limit: self.memory_percent,
            });
        }
        if sample.disk_used_percent > self.disk_percent {
            pressures.push(Pressure::Disk {
                used: sample.disk_used_percent,
                limit: self.disk_percent,
            });
        }

        pressures
    }
}

/// Decision for one candidate workflow
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admit,
    AdmitUnderPressure(Vec<Pressure>),
    Skip(Vec<Pressure>),
}

pub fn decide(priority: Priority, pressures: &[Pressure]) -> Admission {
    match (pressures.is_empty(), priority) {
        (true, _) => Admission::Admit,
        (false, Priority::High) => Admission::AdmitUnderPressure(pressures.to_vec()),
        (false, Priority::Normal) => Admission::Skip(pressures.to_vec()),
    }
}

/// Renders pressures for a log line
pub fn describe(pressures: &[Pressure]) -> String {
    pressures
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
