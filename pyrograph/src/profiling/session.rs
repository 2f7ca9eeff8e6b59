//! # Profiling Sessions
//!
//! A session ties one sampling source to the downstream pipeline:
//!
//! ```text
//! 1. read the region table (/proc/<pid>/maps)
//! 2. arm the source  ──▶ SampleBuffer fills while the workload runs
//! 3. disarm (final ring drain for external targets)
//! 4. symbolize + fold every captured sample ──▶ FoldedStacks
//! ```
//!
//! Capture and symbolization never overlap: the buffer is only read after
//! the source is disarmed, and the resolver, cache and folder are used by
//! the calling thread alone.

use log::{debug, info, warn};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::perf_ring::DrainStats;
use super::perf_source::PerfEventSource;
use super::sample_buffer::SampleBuffer;
use super::timer_sampler::{TimerSampler, DEFAULT_SELF_FREQUENCY_HZ};
use crate::aggregation::{FoldedStacks, FrameFilter, StackFolder};
use crate::domain::{Pid, ProfilerError};
use crate::symbolization::{parse_memory_maps, CacheConfig, OffsetResolver, ResolverStats, SymbolResolver};

/// Default frequency for external targets
pub const DEFAULT_EXTERNAL_FREQUENCY_HZ: u32 = 99;

/// Sampling parameters for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub frequency_hz: u32,
    /// Wall-clock length of an external recording
    pub duration: Duration,
    /// Sample Buffer capacity; captures beyond it are dropped
    pub max_samples: usize,
    /// Perf ring data pages (power of two)
    pub data_pages: usize,
    pub poll_timeout: Duration,
    pub cache: CacheConfig,
}

impl SessionConfig {
    /// Defaults for sampling another process
    #[must_use]
    pub fn external() -> Self {
        Self {
            frequency_hz: DEFAULT_EXTERNAL_FREQUENCY_HZ,
            duration: Duration::from_secs(5),
            max_samples: 500_000,
            data_pages: 128,
            poll_timeout: Duration::from_millis(100),
            cache: CacheConfig::default(),
        }
    }

    /// Defaults for timer-driven self-profiling
    #[must_use]
    pub fn self_profiling() -> Self {
        Self { frequency_hz: DEFAULT_SELF_FREQUENCY_HZ, max_samples: 100_000, ..Self::external() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::external()
    }
}

/// End-of-session statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub pid: i32,
    pub frequency_hz: u32,
    pub elapsed_ms: u64,
    /// Samples held in the buffer when capture stopped
    pub captured: usize,
    /// Captures lost to a full buffer
    pub dropped: u64,
    /// Captures whose stack exceeded the maximum depth
    pub truncated: u64,
    /// Ring counters (external sessions only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring: Option<DrainStats>,
    pub resolver: ResolverStats,
    pub regions: usize,
    /// Samples that contributed to a folded stack
    pub folded_samples: u64,
    /// Samples with no usable frames after filtering
    pub discarded_samples: u64,
    pub distinct_stacks: usize,
}

/// Folded profile plus its statistics
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub folded: FoldedStacks,
    pub summary: SessionSummary,
}

/// Sample an external process through a perf ring buffer
///
/// Runs until `config.duration` elapses, `stop` is set or the target exits.
/// Blocks the calling thread.
///
/// # Errors
/// - [`ProfilerError::ProcessNotFound`] if `pid` does not exist
/// - [`ProfilerError::MemoryMapsReadFailed`] if the target's maps are unreadable
/// - any [`PerfEventSource`] open/control failure
pub fn record_process<R: OffsetResolver>(
    pid: Pid,
    config: &SessionConfig,
    lookup: R,
    stop: &AtomicBool,
) -> Result<SessionOutput, ProfilerError> {
    let regions = parse_memory_maps(pid).map_err(|e| match e {
        ProfilerError::MemoryMapsReadFailed { ref source, .. } if source.kind() == io::ErrorKind::NotFound => {
            ProfilerError::ProcessNotFound(pid)
        }
        other => other,
    })?;
    let source = PerfEventSource::open(pid, config.frequency_hz, config.data_pages)?;
    let reader = source.reader()?;
    let buffer = SampleBuffer::with_capacity(config.max_samples);
    let proc_dir = format!("/proc/{}", pid.0);

    source.enable()?;
    let started = Instant::now();
    let mut ring = DrainStats::default();
    info!("Recording {pid} for {:?}", config.duration);

    while started.elapsed() < config.duration && !stop.load(Ordering::Relaxed) {
        let readable = source.poll(config.poll_timeout)?;
        if readable || reader.has_pending() {
            ring.merge(&reader.drain(&buffer));
        }
        if !Path::new(&proc_dir).exists() {
            info!("{pid} exited, stopping early");
            break;
        }
    }

    source.disable()?;
    ring.merge(&reader.drain(&buffer));
    let elapsed = started.elapsed();
    if ring.lost > 0 {
        warn!("Kernel reported {} lost samples; consider more --mmap-pages", ring.lost);
    }

    let resolver = SymbolResolver::new(regions, lookup, config.cache);
    Ok(fold_buffer(&buffer, resolver, FrameFilter::sentinels(), pid, config, elapsed, Some(ring)))
}

/// Sample the calling thread while it runs `workload`
///
/// # Errors
/// - [`ProfilerError::SessionActive`] if another timer session is armed
/// - [`ProfilerError::TimerInstallFailed`] if the timer cannot be installed
/// - [`ProfilerError::MemoryMapsReadFailed`] if `/proc/self/maps` is unreadable
pub fn self_profile<R, F>(config: &SessionConfig, lookup: R, workload: F) -> Result<SessionOutput, ProfilerError>
where
    R: OffsetResolver,
    F: FnOnce(),
{
    let pid = Pid::current();
    let regions = parse_memory_maps(pid)?;
    let buffer = Arc::new(SampleBuffer::with_capacity(config.max_samples));

    let sampler = TimerSampler::start(Arc::clone(&buffer), config.frequency_hz)?;
    let started = Instant::now();
    workload();
    let buffer = sampler.stop();
    let elapsed = started.elapsed();

    let resolver = SymbolResolver::new(regions, lookup, config.cache);
    Ok(fold_buffer(&buffer, resolver, FrameFilter::self_profiling(), pid, config, elapsed, None))
}

/// Symbolize and fold every sample in a disarmed buffer
fn fold_buffer<R: OffsetResolver>(
    buffer: &SampleBuffer,
    mut resolver: SymbolResolver<R>,
    filter: FrameFilter,
    pid: Pid,
    config: &SessionConfig,
    elapsed: Duration,
    ring: Option<DrainStats>,
) -> SessionOutput {
    let mut folder = StackFolder::new(filter);
    for sample in buffer.iter() {
        folder.add_sample(&mut resolver, sample);
    }
    let discarded_samples = folder.discarded();
    let folded = folder.finish();

    let summary = SessionSummary {
        pid: pid.0,
        frequency_hz: config.frequency_hz,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        captured: buffer.len(),
        dropped: buffer.dropped(),
        truncated: buffer.truncated(),
        ring,
        resolver: resolver.stats(),
        regions: resolver.regions().len(),
        folded_samples: folded.total_samples(),
        discarded_samples,
        distinct_stacks: folded.len(),
    };

    debug!("Session summary: {summary:?}");
    if summary.dropped > 0 {
        warn!("{} samples dropped (buffer capacity {})", summary.dropped, buffer.capacity());
    }
    SessionOutput { folded, summary }
}
