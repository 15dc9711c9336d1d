//! Singleton guard
//!
//! A pid file keeps two orchestrators from scheduling over the same state.
//! A record naming a live process aborts startup; a record naming a dead
//! process is stale and replaced.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::unit::pid_alive;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("another orchestrator is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("failed to access pid file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held for the lifetime of the orchestrator; removes the pid file on drop
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
    released: bool,
}

impl InstanceGuard {
    pub fn acquire(path: &Path) -> Result<Self, GuardError> {
        Self::acquire_with(path, std::process::id(), pid_alive)
    }

    fn acquire_with<F>(path: &Path, pid: u32, alive: F) -> Result<Self, GuardError>
    where
        F: Fn(u32) -> bool,
    {
        let io_err = |source: io::Error| GuardError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(recorded) if recorded != pid && alive(recorded) => {
                    return Err(GuardError::AlreadyRunning(recorded));
                }
                Ok(recorded) => {
                    warn!("Removing stale pid file for pid {}", recorded);
                    remove_if_present(path).map_err(io_err)?;
                }
                Err(_) => {
                    warn!("Removing malformed pid file {}", path.display());
                    remove_if_present(path).map_err(io_err)?;
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Lost a race against another starting orchestrator
                let recorded = std::fs::read_to_string(path)
                    .ok()
                    .and_then(|c| c.trim().parse().ok())
                    .unwrap_or(0);
                return Err(GuardError::AlreadyRunning(recorded));
            }
            Err(e) => return Err(io_err(e)),
        };
        writeln!(file, "{}", pid).map_err(io_err)?;

        info!("Acquired pid file {} (pid {})", path.display(), pid);
        Ok(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    /// Removes the pid file
    pub fn release(mut self) -> Result<(), GuardError> {
        self.released = true;
        remove_if_present(&self.path).map_err(|source| GuardError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = remove_if_present(&self.path);
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
