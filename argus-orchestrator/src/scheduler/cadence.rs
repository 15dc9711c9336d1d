//! Cadence bookkeeping
//!
//! Decides, for one tick of the control loop, which duties are due. Daily
//! and hourly markers are persisted so a restarted orchestrator does not
//! run the same cadence slot twice.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::warn;

/// Minute of the hour at which the stuck-unit sweep runs
pub const SWEEP_MINUTE: u32 = 30;

/// Minutes after the top of the daily hour in which a missed `:00` tick
/// can still start the daily workflows
pub const DAILY_GRACE_MINUTES: u32 = 5;

/// Minutes of the hour at which resources are sampled for logging
pub const SAMPLE_MINUTES: [u32; 2] = [15, 45];

/// Last fired cadence slots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceState {
    /// Date on which daily workflows last ran
    pub last_daily: Option<NaiveDate>,
    /// (date, hour) at which hourly workflows last ran
    pub last_hourly: Option<(NaiveDate, u32)>,
}

/// Work due on one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Duties {
    pub hourly: bool,
    pub daily: bool,
    pub sweep: bool,
    pub sample: bool,
}

impl CadenceState {
    /// Reads persisted state; a missing or unreadable file starts fresh
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(
                    "Ignoring unreadable scheduler state {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Failed to read scheduler state {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)
    }

    /// Computes the duties of a tick and marks cadence slots as fired
    ///
    /// Hourly work is due at minute 0, at most once per (date, hour).
    /// Daily work is due on the first tick in the first
    /// `DAILY_GRACE_MINUTES` of `daily_hour` whose date has not run yet, so
    /// a missed `:00` tick is tolerated.
    pub fn due(&mut self, now: DateTime<Utc>, daily_hour: u32) -> Duties {
        let date = now.date_naive();
        let hour = now.hour();
        let minute = now.minute();

        let hourly = minute == 0 && self.last_hourly != Some((date, hour));
        if hourly {
            self.last_hourly = Some((date, hour));
        }

        let daily = hour == daily_hour
            && minute < DAILY_GRACE_MINUTES
            && self.last_daily != Some(date);
        if daily {
            self.last_daily = Some(date);
        }

        Duties {
            hourly,
            daily,
            sweep: minute == SWEEP_MINUTE,
            sample: SAMPLE_MINUTES.contains(&minute),
        }
    }
}
