//! Runner configuration
//!
//! Defines where a unit of work reads and writes, whether run directories
//! are retained, and how notifications are retried.

use argus_core::Layout;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::notify::RetryPolicy;

/// Mail program used when `ARGUS_MAILER` is not set
pub const DEFAULT_MAILER: &str = "sendemail";

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: Layout,

    /// Keep run scratch directories after the run completes
    pub keep_runs: bool,

    /// Delivery retry schedule
    pub retry: RetryPolicy,

    /// `sendemail`-compatible mail program
    pub mailer: String,

    /// Explicit credentials file, searched before the default locations
    pub credentials_file: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            keep_runs: true,
            retry: RetryPolicy::default(),
            mailer: DEFAULT_MAILER.to_string(),
            credentials_file: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ARGUS_HOME and the per-directory overrides (see `Layout::from_env`)
    /// - ARGUS_KEEP_RUNS (optional, default: true)
    /// - ARGUS_NOTIFY_MAX_ATTEMPTS (optional, default: 5)
    /// - ARGUS_NOTIFY_BASE_DELAY (optional, seconds, default: 10)
    /// - ARGUS_NOTIFY_TIMEOUT (optional, seconds, default: 60)
    /// - ARGUS_MAILER (optional, default: sendemail)
    /// - ARGUS_CONFIG (optional, credentials file)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(Layout::from_env(), |name| std::env::var(name).ok())
    }

    /// Builds configuration from `lookup`; a malformed value is an error
    fn from_lookup<F>(layout: Layout, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(layout);

        if let Some(keep) = lookup("ARGUS_KEEP_RUNS")
            && !keep.trim().is_empty()
        {
            config.keep_runs = parse_bool(&keep)
                .ok_or_else(|| anyhow::anyhow!("invalid ARGUS_KEEP_RUNS '{}'", keep))?;
        }

        if let Some(attempts) = parse_var(&lookup, "ARGUS_NOTIFY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(secs) = parse_var(&lookup, "ARGUS_NOTIFY_BASE_DELAY")? {
            config.retry.base_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "ARGUS_NOTIFY_TIMEOUT")? {
            config.retry.attempt_timeout = Duration::from_secs(secs);
        }

        if let Some(mailer) = lookup("ARGUS_MAILER")
            && !mailer.trim().is_empty()
        {
            config.mailer = mailer.trim().to_string();
        }

        config.credentials_file = lookup("ARGUS_CONFIG")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("notification max attempts must be greater than 0");
        }

        if self.retry.attempt_timeout.is_zero() {
            anyhow::bail!("notification timeout must be greater than 0");
        }

        if self.mailer.is_empty() {
            anyhow::bail!("mailer cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Layout::default())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
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
