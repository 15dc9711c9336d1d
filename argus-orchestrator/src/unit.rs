//! Background unit handles
//!
//! A launched unit is observed through a handle rather than by probing the
//! tracking file. Units launched by this orchestrator own their child
//! process; units inherited from a previous orchestrator are only known by
//! pid.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::process::Child;

/// A running background unit
pub trait UnitHandle: Send {
    fn pid(&self) -> u32;

    /// Whether the unit has exited; reaps it if so
    fn has_exited(&mut self) -> bool;

    /// Requests termination without waiting for the exit
    fn terminate(&mut self) -> Result<()>;
}

/// A unit launched by this orchestrator
pub struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl UnitHandle for ChildHandle {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        // An error means the child can no longer be waited on
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> Result<()> {
        send_terminate(self.child.id())
    }
}

/// A unit restored from the tracking file after a restart
pub struct AdoptedHandle {
    pid: u32,
}

impl AdoptedHandle {
    /// Adopts `pid` if that process still exists
    pub fn adopt(pid: u32) -> Option<Self> {
        pid_alive(pid).then_some(Self { pid })
    }
}

impl UnitHandle for AdoptedHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        !pid_alive(self.pid)
    }

    fn terminate(&mut self) -> Result<()> {
        send_terminate(self.pid)
    }
}

/// Whether a process with this pid exists
pub fn pid_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to another user
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn send_terminate(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).context("pid out of range")?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to terminate pid {}", pid)),
    }
}
