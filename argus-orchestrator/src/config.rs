//! Orchestrator configuration

use argus_core::Layout;
use argus_core::domain::process::MAX_RUNTIME;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::admission::Thresholds;

/// Hour (UTC) at which daily workflows run unless configured otherwise
pub const DEFAULT_DAILY_HOUR: u32 = 6;

/// Pause between consecutive launches in one tick
pub const DEFAULT_LAUNCH_STAGGER: Duration = Duration::from_secs(5);

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: Layout,

    /// Path of the `argus-runner` binary
    pub runner: PathBuf,

    pub daily_hour: u32,

    /// Runtime after which a normal-priority unit is terminated
    pub max_runtime: Duration,

    pub launch_stagger: Duration,

    pub thresholds: Thresholds,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            runner: default_runner(),
            daily_hour: DEFAULT_DAILY_HOUR,
            max_runtime: MAX_RUNTIME,
            launch_stagger: DEFAULT_LAUNCH_STAGGER,
            thresholds: Thresholds::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ARGUS_HOME and the per-directory overrides (see `Layout::from_env`)
    /// - ARGUS_RUNNER (optional, default: `argus-runner` next to this binary)
    /// - ARGUS_DAILY_HOUR (optional, default: 6)
    /// - ARGUS_MAX_RUNTIME (optional, seconds, default: 21600)
    /// - ARGUS_LAUNCH_STAGGER (optional, seconds, default: 5)
    /// - ARGUS_LOAD_FACTOR (optional, default: 0.8)
    /// - ARGUS_MEMORY_THRESHOLD, ARGUS_DISK_THRESHOLD (optional, percent, default: 90)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(Layout::from_env(), |name| std::env::var(name).ok())
    }

    /// Builds configuration from `lookup`; a malformed value is an error
    fn from_lookup<F>(layout: Layout, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(layout);

        if let Some(runner) = lookup("ARGUS_RUNNER")
            && !runner.trim().is_empty()
        {
            config.runner = PathBuf::from(runner.trim());
        }

        if let Some(hour) = parse_var(&lookup, "ARGUS_DAILY_HOUR")? {
            config.daily_hour = hour;
        }
        if let Some(secs) = parse_var(&lookup, "ARGUS_MAX_RUNTIME")? {
            config.max_runtime = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "ARGUS_LAUNCH_STAGGER")? {
            config.launch_stagger = Duration::from_secs(secs);
        }
        if let Some(factor) = parse_var(&lookup, "ARGUS_LOAD_FACTOR")? {
            config.thresholds.load_factor = factor;
        }
        if let Some(percent) = parse_var(&lookup, "ARGUS_MEMORY_THRESHOLD")? {
            config.thresholds.memory_percent = percent;
        }
        if let Some(percent) = parse_var(&lookup, "ARGUS_DISK_THRESHOLD")? {
            config.thresholds.disk_percent = percent;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.daily_hour > 23 {
            anyhow::bail!("daily hour must be between 0 and 23");
        }

        if self.max_runtime.is_zero() {
            anyhow::bail!("max runtime must be greater than 0");
        }

        if self.thresholds.load_factor.is_nan() || self.thresholds.load_factor <= 0.0 {
            anyhow::bail!("load factor must be greater than 0");
        }

        for (name, value) in [
            ("memory", self.thresholds.memory_percent),
            ("disk", self.thresholds.disk_percent),
        ] {
            if value.is_nan() || value <= 0.0 || value > 100.0 {
                anyhow::bail!("{} threshold must be in (0, 100], got {}", name, value);
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Layout::default())
    }
}

fn default_runner() -> PathBuf {
    std::env::current_exe()
        .map(|exe| exe.with_file_name("argus-runner"))
        .unwrap_or_else(|_| PathBuf::from("argus-runner"))
}

/// Parses an optional variable; unset or blank means "keep the default"
fn parse_var<F, T>(lookup: &F, name: &str) -> anyhow::Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("invalid {} '{}'", name, value)),
        _ => Ok(None),
    }
}
