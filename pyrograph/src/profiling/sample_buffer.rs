//! # Sample Buffer
//!
//! Fixed-capacity, append-only storage for raw stack captures that is safe to
//! write from a signal handler.
//!
//! ## Capture Contract
//!
//! - All slots are allocated up front; capturing never allocates
//! - A single atomic cursor hands out slot indices (`fetch_add`), so a
//!   capture that re-enters another capture still gets its own slot
//! - When the buffer is full, captures are dropped and counted, never
//!   overwritten and never blocked on
//! - Each slot carries a `ready` flag published with `Release` after the
//!   sample is fully written; readers only look at ready slots
//!
//! A slot is written exactly once (its index is handed out exactly once),
//! so reading a ready slot can never race with a writer, even while the
//! sampling source is still armed.

#![allow(unsafe_code)]

use pyrograph_common::RawSample;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Result of a single capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The sample was stored in a slot
    Stored,
    /// The buffer was full; the drop counter was incremented
    Dropped,
    /// The capture produced no frames and was not stored
    Empty,
}

struct Slot {
    sample: UnsafeCell<RawSample>,
    ready: AtomicBool,
}

/// Lock-free, allocation-free (after construction) sample store
pub struct SampleBuffer {
    slots: Box<[Slot]>,
    next: AtomicUsize,
    dropped: AtomicU64,
    truncated: AtomicU64,
}

// SAFETY: a slot's `UnsafeCell` is only written by the single capture that
// won its index from `next`, and only read after `ready` was published with
// Release ordering. No slot is ever written twice.
unsafe impl Sync for SampleBuffer {}

impl SampleBuffer {
    /// Pre-allocate a buffer holding up to `capacity` samples
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot { sample: UnsafeCell::new(RawSample::EMPTY), ready: AtomicBool::new(false) })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            next: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
        }
    }

    /// Maximum number of samples this buffer can hold
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether further captures will be dropped
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.next.load(Ordering::Relaxed) >= self.slots.len()
    }

    /// Number of slots handed out so far (bounded by capacity)
    #[must_use]
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.slots.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captures dropped because the buffer was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stored samples whose stack was deeper than the depth limit
    #[must_use]
    pub fn truncated(&self) -> u64 {
        self.truncated.load(Ordering::Relaxed)
    }

    /// Capture a sample produced by `fill`
    ///
    /// `fill` writes frames into a zeroed stack-local sample and sets its
    /// `depth`/`truncated` fields. Async-signal-safe as long as `fill` is:
    /// no locks, no allocation, bounded time.
    pub fn capture_with<F>(&self, fill: F) -> CaptureOutcome
    where
        F: FnOnce(&mut RawSample),
    {
        // Cheap early-out so a full buffer does not pay for a stack walk
        if self.is_full() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return CaptureOutcome::Dropped;
        }

        let mut sample = RawSample::EMPTY;
        fill(&mut sample);
        self.push(&sample)
    }

    /// Store an already-captured sample
    pub fn push(&self, sample: &RawSample) -> CaptureOutcome {
        if sample.frames().is_empty() {
            return CaptureOutcome::Empty;
        }

        let index = self.next.fetch_add(1, Ordering::AcqRel);
        let Some(slot) = self.slots.get(index) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return CaptureOutcome::Dropped;
        };

        // SAFETY: `index` was handed out to this call only, see `Sync` impl.
        unsafe {
            *slot.sample.get() = *sample;
        }
        slot.ready.store(true, Ordering::Release);

        if sample.is_truncated() {
            self.truncated.fetch_add(1, Ordering::Relaxed);
        }
        CaptureOutcome::Stored
    }

    /// Iterate over fully written samples in capture order
    pub fn iter(&self) -> impl Iterator<Item = &RawSample> + '_ {
        self.slots[..self.len()].iter().filter_map(|slot| {
            if slot.ready.load(Ordering::Acquire) {
                // SAFETY: ready slots are never written again.
                Some(unsafe { &*slot.sample.get() })
            } else {
                None
            }
        })
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrograph_common::MAX_STACK_DEPTH;

    #[test]
    fn test_capture_and_iterate_in_order() {
        let buffer = SampleBuffer::with_capacity(4);
        assert_eq!(buffer.push(&RawSample::from_frames(&[1, 2])), CaptureOutcome::Stored);
        assert_eq!(buffer.push(&RawSample::from_frames(&[3])), CaptureOutcome::Stored);

        let frames: Vec<Vec<u64>> = buffer.iter().map(|s| s.frames().to_vec()).collect();
        assert_eq!(frames, vec![vec![1, 2], vec![3]]);
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn test_full_buffer_drops_and_counts() {
        let buffer = SampleBuffer::with_capacity(2);
        for ip in 1..=5 {
            buffer.capture_with(|sample| {
                sample.ips[0] = ip;
                sample.depth = 1;
            });
        }

        assert!(buffer.is_full());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 3);
        // Never overwritten: the first two captures survive
        let ips: Vec<u64> = buffer.iter().map(|s| s.frames()[0]).collect();
        assert_eq!(ips, vec![1, 2]);
    }

    #[test]
    fn test_empty_capture_is_not_stored() {
        let buffer = SampleBuffer::with_capacity(2);
        assert_eq!(buffer.capture_with(|_| {}), CaptureOutcome::Empty);
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn test_truncated_samples_are_counted() {
        let buffer = SampleBuffer::with_capacity(2);
        buffer.push(&RawSample::from_frames(&[9; MAX_STACK_DEPTH + 1]));
        assert_eq!(buffer.truncated(), 1);
        assert_eq!(buffer.iter().count(), 1);
    }

    #[test]
    fn test_concurrent_captures_account_for_every_attempt() {
        let buffer = SampleBuffer::with_capacity(1000);
        std::thread::scope(|scope| {
            for thread in 0..4u64 {
                let buffer = &buffer;
                scope.spawn(move || {
                    for i in 0..400u64 {
                        buffer.push(&RawSample::from_frames(&[thread * 1000 + i + 1]));
                    }
                });
            }
        });

        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.dropped(), 600);
        assert_eq!(buffer.iter().count(), 1000);
    }
}
