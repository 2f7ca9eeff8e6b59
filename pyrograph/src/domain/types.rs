//! Domain types providing compile-time safety and self-documentation

use std::fmt;

/// Process ID
///
/// Represents the process being profiled (or this process when
/// self-profiling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// The calling process
    #[must_use]
    pub fn current() -> Self {
        Pid(i32::try_from(std::process::id()).unwrap_or(i32::MAX))
    }

    /// Path of this process's memory map listing
    #[must_use]
    pub fn maps_path(self) -> String {
        format!("/proc/{}/maps", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(pid: i32) -> Self {
        Pid(pid)
    }
}

impl From<Pid> for i32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}
