//! Tracked process domain types
//!
//! A `ProcessRecord` describes one in-flight background unit. Records are
//! persisted to an append-only tracking file, one `pid:workflow:timestamp:priority`
//! line per launch, with the timestamp in Unix seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::workflow::Priority;

/// Maximum runtime before a non-high-priority unit is considered stuck
pub const MAX_RUNTIME: Duration = Duration::from_secs(6 * 60 * 60);

/// One launched background unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub workflow: String,
    pub launched_at: DateTime<Utc>,
    pub priority: Priority,
}

impl ProcessRecord {
    pub fn new(pid: u32, workflow: &str, launched_at: DateTime<Utc>, priority: Priority) -> Self {
        Self {
            pid,
            workflow: workflow.to_string(),
            launched_at,
            priority,
        }
    }

    /// Time since launch, zero if `now` is before the launch
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.launched_at).to_std().unwrap_or_default()
    }

    /// Whether the sweep should terminate this unit
    ///
    /// High-priority units are never considered stuck.
    pub fn is_overdue(&self, now: DateTime<Utc>, max_runtime: Duration) -> bool {
        self.priority != Priority::High && self.elapsed(now) > max_runtime
    }
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.pid,
            self.workflow,
            self.launched_at.timestamp(),
            self.priority
        )
    }
}

/// Error returned for a malformed tracking-file line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed process record '{line}': {reason}")]
pub struct ParseRecordError {
    pub line: String,
    pub reason: String,
}

impl FromStr for ProcessRecord {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| ParseRecordError {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = line.trim().split(':').collect();
        let [pid, workflow, timestamp, priority] = parts.as_slice() else {
            return Err(fail("expected 4 ':'-separated fields"));
        };

        let pid = pid.parse::<u32>().map_err(|_| fail("invalid pid"))?;
        if workflow.is_empty() {
            return Err(fail("empty workflow name"));
        }
        let secs = timestamp
            .parse::<i64>()
            .map_err(|_| fail("invalid timestamp"))?;
        let launched_at = DateTime::from_timestamp(secs, 0).ok_or_else(|| fail("timestamp out of range"))?;
        let priority = priority
            .parse::<Priority>()
            .map_err(|e| fail(&e.to_string()))?;

        Ok(Self::new(pid, workflow, launched_at, priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_line_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let record = ProcessRecord::new(4242, "subdomains", at, Priority::Normal);

        let line = record.to_string();
        assert_eq!(line, format!("4242:subdomains:{}:normal", at.timestamp()));
        assert_eq!(line.parse::<ProcessRecord>().unwrap(), record);
    }

    #[test]
    fn test_record_parse_rejects_malformed() {
        assert!("".parse::<ProcessRecord>().is_err());
        assert!("12:wf:100".parse::<ProcessRecord>().is_err());
        assert!("x:wf:100:normal".parse::<ProcessRecord>().is_err());
        assert!("12::100:normal".parse::<ProcessRecord>().is_err());
        assert!("12:wf:100:urgent".parse::<ProcessRecord>().is_err());
    }

    #[test]
    fn test_is_overdue_respects_priority() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let later = at + chrono::Duration::hours(6) + chrono::Duration::minutes(1);

        let normal = ProcessRecord::new(1, "ports", at, Priority::Normal);
        let high = ProcessRecord::new(2, "vulns", at, Priority::High);

        assert!(normal.is_overdue(later, MAX_RUNTIME));
        assert!(!high.is_overdue(later, MAX_RUNTIME));
        assert!(!normal.is_overdue(at + chrono::Duration::hours(6), MAX_RUNTIME));
    }

    #[test]
    fn test_elapsed_clamps_clock_skew() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let record = ProcessRecord::new(1, "ports", at, Priority::Normal);
        assert_eq!(record.elapsed(at - chrono::Duration::minutes(5)), Duration::ZERO);
    }
}
