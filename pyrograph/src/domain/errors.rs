//! Structured error types for pyrograph
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Pid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("perf_event_open failed for {pid}: {source}")]
    PerfOpenFailed {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to map perf ring buffer: {0}")]
    MmapFailed(#[source] std::io::Error),

    #[error("Ring buffer data size {0} is not a power of two")]
    InvalidRingSize(u64),

    #[error("A timer-driven sampling session is already active in this process")]
    SessionActive,

    #[error("Failed to install sampling timer: {0}")]
    TimerInstallFailed(#[source] std::io::Error),

    #[error("Failed to read {path}")]
    MemoryMapsReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No samples to render (the profile is empty)")]
    NoSamples,

    #[error("Invalid canvas width {0}: must be larger than the side margins")]
    InvalidWidth(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FoldError {
    #[error("Failed to read folded stacks: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write folded stacks: {0}")]
    Write(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_error_display() {
        let err = ProfilerError::ProcessNotFound(Pid(1234));
        assert_eq!(err.to_string(), "Process PID:1234 not found");
    }

    #[test]
    fn test_perf_open_error_mentions_pid() {
        let err = ProfilerError::PerfOpenFailed {
            pid: Pid(77),
            source: std::io::Error::from_raw_os_error(libc::EACCES),
        };
        assert!(err.to_string().contains("PID:77"));
    }

    #[test]
    fn test_no_samples_is_distinct() {
        let err = RenderError::NoSamples;
        assert!(err.to_string().contains("No samples"));
        assert!(!matches!(err, RenderError::InvalidWidth(_)));
    }
}
