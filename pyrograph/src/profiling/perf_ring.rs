//! # Kernel Ring Buffer Draining
//!
//! Consumes variable-length records from a perf ring buffer and turns
//! callchain samples into [`RawSample`]s.
//!
//! ## Cursor Protocol
//!
//! ```text
//!   data area (power-of-two size, offsets masked with size - 1)
//!   ┌──────────────────────────────────────────────────────┐
//!   │ ..consumed.. │ tail ──── unread records ──── head │  │
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! - `head` is advanced by the kernel; it is loaded with `Acquire` ordering
//!   before any record bytes are read, so a record is never read torn
//! - `tail` is advanced by us; it is stored with `Release` ordering after
//!   the records are copied out, so the kernel never overwrites unread data
//! - Both cursors grow monotonically; only their masked value is an offset.
//!   A record may straddle the end of the data area and is read in two
//!   spans
//!
//! ## Bounded Loss
//!
//! - Callchain context markers are skipped, not treated as frames
//! - Stacks deeper than the depth limit are truncated
//! - When the sink is full, the rest of the current window is discarded
//! - A corrupt header (size smaller than a header, or past `head`) discards
//!   the rest of the window instead of looping forever

use log::{debug, trace, warn};
use pyrograph_common::{
    is_context_marker, PerfEventHeader, RawSample, MAX_STACK_DEPTH, PERF_RECORD_LOST,
    PERF_RECORD_SAMPLE,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::sample_buffer::{CaptureOutcome, SampleBuffer};
use crate::domain::ProfilerError;

/// Memory shared with the ring buffer producer
///
/// Implemented by the mmap'd perf ring and by [`InMemoryRing`] for tests.
pub trait RingMemory {
    /// Size of the data area in bytes (a power of two)
    fn data_size(&self) -> u64;

    /// Producer cursor, read with acquire semantics
    fn load_head(&self) -> u64;

    /// Consumer cursor
    fn load_tail(&self) -> u64;

    /// Publish the consumer cursor with release semantics
    fn store_tail(&self, tail: u64);

    /// Copy `dst.len()` bytes starting at data offset `offset`
    ///
    /// Callers guarantee `offset + dst.len() <= data_size()`.
    fn read_span(&self, offset: usize, dst: &mut [u8]);
}

/// Counters from one or more drain passes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Records consumed (all types)
    pub records: u64,
    /// Samples stored in the sink
    pub samples: u64,
    /// Records the kernel reported as lost
    pub lost: u64,
    /// Stored samples whose stack was truncated
    pub truncated: u64,
    /// Context markers skipped inside callchains
    pub sentinels_skipped: u64,
    /// Bytes dropped because the sink was full or a header was corrupt
    pub discarded_bytes: u64,
    /// Sample records with no frames left after removing markers
    pub empty_stacks: u64,
}

impl DrainStats {
    pub fn merge(&mut self, other: &DrainStats) {
        self.records += other.records;
        self.samples += other.samples;
        self.lost += other.lost;
        self.truncated += other.truncated;
        self.sentinels_skipped += other.sentinels_skipped;
        self.discarded_bytes += other.discarded_bytes;
        self.empty_stacks += other.empty_stacks;
    }
}

/// Consumer side of a perf ring buffer
pub struct RingReader<M> {
    memory: M,
    mask: u64,
}

impl<M: RingMemory> RingReader<M> {
    /// Wrap ring memory, validating its size
    ///
    /// # Errors
    /// [`ProfilerError::InvalidRingSize`] if the data area is not a non-zero
    /// power of two.
    pub fn new(memory: M) -> Result<Self, ProfilerError> {
        let size = memory.data_size();
        if size == 0 || !size.is_power_of_two() {
            return Err(ProfilerError::InvalidRingSize(size));
        }
        Ok(Self { memory, mask: size - 1 })
    }

    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Whether unread records are pending
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.memory.load_head() != self.memory.load_tail()
    }

    /// Consume every record currently between tail and head
    pub fn drain(&self, sink: &SampleBuffer) -> DrainStats {
        let mut stats = DrainStats::default();
        let head = self.memory.load_head();
        let mut tail = self.memory.load_tail();

        while tail < head {
            let remaining = head - tail;

            if sink.is_full() {
                trace!("Sink full, discarding {remaining} unread bytes");
                stats.discarded_bytes += remaining;
                tail = head;
                break;
            }

            let header = self.read_header(tail);
            let size = u64::from(header.size);
            if size < PerfEventHeader::SIZE as u64 || size > remaining {
                warn!(
                    "Corrupt ring record at {tail} (type {}, size {size}), discarding {remaining} bytes",
                    header.kind
                );
                stats.discarded_bytes += remaining;
                tail = head;
                break;
            }

            stats.records += 1;
            let body = tail + PerfEventHeader::SIZE as u64;
            let body_len = size - PerfEventHeader::SIZE as u64;

            match header.kind {
                PERF_RECORD_SAMPLE => self.consume_sample(body, body_len, sink, &mut stats),
                PERF_RECORD_LOST if body_len >= 16 => {
                    let lost = self.read_u64(body + 8);
                    debug!("Kernel lost {lost} records");
                    stats.lost += lost;
                }
                other => trace!("Skipping record type {other} ({size} bytes)"),
            }

            tail += size;
        }

        self.memory.store_tail(tail);
        stats
    }

    fn consume_sample(&self, body: u64, body_len: u64, sink: &SampleBuffer, stats: &mut DrainStats) {
        if body_len < 8 {
            stats.empty_stacks += 1;
            return;
        }
        let nr = self.read_u64(body).min((body_len - 8) / 8);

        let mut sample = RawSample::EMPTY;
        let mut depth = 0usize;
        for i in 0..nr {
            let ip = self.read_u64(body + 8 + i * 8);
            if is_context_marker(ip) {
                stats.sentinels_skipped += 1;
                continue;
            }
            if depth == MAX_STACK_DEPTH {
                sample.truncated = 1;
                break;
            }
            sample.ips[depth] = ip;
            depth += 1;
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            sample.depth = depth as u32;
        }

        match sink.push(&sample) {
            CaptureOutcome::Stored => {
                stats.samples += 1;
                if sample.is_truncated() {
                    stats.truncated += 1;
                }
            }
            CaptureOutcome::Empty => stats.empty_stacks += 1,
            CaptureOutcome::Dropped => {}
        }
    }

    fn read_header(&self, position: u64) -> PerfEventHeader {
        let mut bytes = [0u8; PerfEventHeader::SIZE];
        self.read_bytes(position, &mut bytes);
        PerfEventHeader::from_ne_bytes(bytes)
    }

    fn read_u64(&self, position: u64) -> u64 {
        let mut bytes = [0u8; 8];
        self.read_bytes(position, &mut bytes);
        u64::from_ne_bytes(bytes)
    }

    /// Copy bytes at a cursor position, splitting at the wrap boundary
    #[allow(clippy::cast_possible_truncation)]
    fn read_bytes(&self, position: u64, dst: &mut [u8]) {
        let offset = (position & self.mask) as usize;
        let size = (self.mask + 1) as usize;
        let first = dst.len().min(size - offset);
        let (front, back) = dst.split_at_mut(first);
        self.memory.read_span(offset, front);
        if !back.is_empty() {
            self.memory.read_span(0, back);
        }
    }
}

/// Heap-backed ring with the same cursor protocol as the kernel's
///
/// Used to exercise the reader without perf permissions.
pub struct InMemoryRing {
    data: Vec<u8>,
    head: AtomicU64,
    tail: AtomicU64,
}

impl InMemoryRing {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size], head: AtomicU64::new(0), tail: AtomicU64::new(0) }
    }

    /// Start both cursors at `position` (to place records across the wrap)
    #[must_use]
    pub fn starting_at(mut self, position: u64) -> Self {
        *self.head.get_mut() = position;
        *self.tail.get_mut() = position;
        self
    }

    /// Append a record at `head`, wrapping as the kernel does
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_record(&mut self, kind: u32, body: &[u8]) {
        let size = (PerfEventHeader::SIZE + body.len()) as u16;
        let header = PerfEventHeader { kind, misc: 0, size };
        let head = *self.head.get_mut();
        self.write_at(head, &header.to_ne_bytes());
        self.write_at(head + PerfEventHeader::SIZE as u64, body);
        *self.head.get_mut() = head + u64::from(size);
    }

    /// Append a callchain sample record
    pub fn write_sample(&mut self, ips: &[u64]) {
        let mut body = Vec::with_capacity(8 + ips.len() * 8);
        body.extend_from_slice(&(ips.len() as u64).to_ne_bytes());
        for ip in ips {
            body.extend_from_slice(&ip.to_ne_bytes());
        }
        self.write_record(PERF_RECORD_SAMPLE, &body);
    }

    /// Append a lost-records notification
    pub fn write_lost(&mut self, lost: u64) {
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&0u64.to_ne_bytes());
        body.extend_from_slice(&lost.to_ne_bytes());
        self.write_record(PERF_RECORD_LOST, &body);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_at(&mut self, position: u64, bytes: &[u8]) {
        let len = self.data.len();
        for (i, byte) in bytes.iter().enumerate() {
            self.data[(position as usize + i) % len] = *byte;
        }
    }
}

impl RingMemory for InMemoryRing {
    fn data_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn load_head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    fn load_tail(&self) -> u64 {
        self.tail.load(Ordering::Relaxed)
    }

    fn store_tail(&self, tail: u64) {
        self.tail.store(tail, Ordering::Release);
    }

    fn read_span(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrograph_common::PERF_CONTEXT_MAX;

    fn reader(ring: InMemoryRing) -> RingReader<InMemoryRing> {
        RingReader::new(ring).expect("power-of-two ring")
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let result = RingReader::new(InMemoryRing::new(100));
        assert!(matches!(result, Err(ProfilerError::InvalidRingSize(100))));
    }

    #[test]
    fn test_drains_samples_and_advances_tail() {
        let mut ring = InMemoryRing::new(256);
        ring.write_sample(&[0x1000, 0x2000]);
        ring.write_sample(&[0x3000]);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.samples, 2);
        assert!(!reader.has_pending());

        let stacks: Vec<Vec<u64>> = sink.iter().map(|s| s.frames().to_vec()).collect();
        assert_eq!(stacks, vec![vec![0x1000, 0x2000], vec![0x3000]]);
    }

    #[test]
    fn test_context_markers_are_skipped() {
        let mut ring = InMemoryRing::new(256);
        ring.write_sample(&[u64::MAX - 127, 0x1000, PERF_CONTEXT_MAX, 0x2000]);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.sentinels_skipped, 2);
        assert_eq!(sink.iter().next().map(|s| s.frames().to_vec()), Some(vec![0x1000, 0x2000]));
    }

    #[test]
    fn test_marker_only_stack_is_not_stored() {
        let mut ring = InMemoryRing::new(256);
        ring.write_sample(&[u64::MAX - 511]);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.empty_stacks, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_record_straddling_wrap_boundary() {
        // Header starts 4 bytes before the end of the data area
        let mut ring = InMemoryRing::new(64).starting_at(60);
        ring.write_sample(&[0xaaaa, 0xbbbb]);
        ring.write_sample(&[0xcccc]);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.discarded_bytes, 0);
        let stacks: Vec<Vec<u64>> = sink.iter().map(|s| s.frames().to_vec()).collect();
        assert_eq!(stacks, vec![vec![0xaaaa, 0xbbbb], vec![0xcccc]]);
    }

    #[test]
    fn test_lost_records_are_counted() {
        let mut ring = InMemoryRing::new(256);
        ring.write_lost(17);
        ring.write_record(3, &[0; 16]);
        ring.write_sample(&[0x1000]);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.lost, 17);
        assert_eq!(stats.samples, 1);
    }

    #[test]
    fn test_full_sink_discards_remaining_window() {
        let mut ring = InMemoryRing::new(256);
        for ip in 1..=4 {
            ring.write_sample(&[ip]);
        }
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(2);

        let stats = reader.drain(&sink);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.discarded_bytes, 2 * 24);
        assert!(!reader.has_pending());
    }

    #[test]
    fn test_zero_size_header_discards_instead_of_spinning() {
        let mut ring = InMemoryRing::new(64);
        ring.write_sample(&[0x1000]);
        // Forge a head past a zeroed header
        let head = ring.head.load(Ordering::Relaxed);
        ring.head.store(head + 16, Ordering::Relaxed);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.discarded_bytes, 16);
        assert!(!reader.has_pending());
    }

    #[test]
    fn test_deep_stack_is_truncated() {
        let ips: Vec<u64> = (1..=(MAX_STACK_DEPTH as u64 + 10)).collect();
        let mut ring = InMemoryRing::new(1024);
        ring.write_sample(&ips);
        let reader = reader(ring);
        let sink = SampleBuffer::with_capacity(8);

        let stats = reader.drain(&sink);
        assert_eq!(stats.truncated, 1);
        assert_eq!(sink.iter().next().map(|s| s.frames().len()), Some(MAX_STACK_DEPTH));
    }
}
