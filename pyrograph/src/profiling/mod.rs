//! Profiling core modules
//!
//! Everything on the capture side of the pipeline:
//! - Sample Buffer shared by both sampling sources
//! - Timer-driven self-sampling (`SIGPROF`)
//! - Perf ring buffer draining and the perf event source
//! - Session lifecycle (arm, capture, disarm, fold)
//! - Built-in demo workload

pub mod perf_ring;
pub mod perf_source;
pub mod sample_buffer;
pub mod session;
pub mod timer_sampler;
pub mod workload;

// Re-export common types
pub use perf_ring::{DrainStats, InMemoryRing, RingMemory, RingReader};
pub use perf_source::{MmapRing, PerfEventSource};
pub use sample_buffer::{CaptureOutcome, SampleBuffer};
pub use session::{
    record_process, self_profile, SessionConfig, SessionOutput, SessionSummary,
    DEFAULT_EXTERNAL_FREQUENCY_HZ,
};
pub use timer_sampler::{sampling_interval, TimerSampler, DEFAULT_SELF_FREQUENCY_HZ};
