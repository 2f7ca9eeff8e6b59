//! # Shared Capture Layouts (sampling sources ↔ pipeline)
//!
//! Defines the fixed-size records and constants shared between the capture
//! side (signal handler, kernel ring buffer) and the decoding side of the
//! pipeline. All types use `#[repr(C)]` so a record written by one side can
//! be reinterpreted by the other without translation.
//!
//! ## Sampling Sources
//!
//! Two capture protocols produce the same [`RawSample`]:
//!
//! 1. **Timer-driven** - `SIGPROF` at ~997 Hz, stack walked in the handler
//! 2. **Kernel ring buffer** - `perf_event_open` callchain records, drained
//!    by polling
//!
//! ## Key Types
//!
//! - [`RawSample`] - One captured call stack (deepest frame first)
//! - [`PerfEventHeader`] - Header preceding every ring buffer record

#![no_std]

// ============================================================================
// Capture Limits
// ============================================================================

/// Maximum number of stack frames recorded per sample
///
/// Deeper stacks are truncated (the outermost frames are lost), never
/// rejected.
pub const MAX_STACK_DEPTH: usize = 64;

/// Lowest address of the privileged (kernel) half of the address space
///
/// Addresses at or above this value never belong to a user mapping and are
/// classified as `[kernel]` instead of being looked up.
pub const KERNEL_SPACE_START: u64 = 0xffff_0000_0000_0000;

/// Lowest callchain context marker emitted by the kernel
///
/// Values in `PERF_CONTEXT_MAX..=u64::MAX` (`PERF_CONTEXT_KERNEL`,
/// `PERF_CONTEXT_USER`, ...) separate kernel and user sections of a
/// callchain. They are not instruction pointers.
pub const PERF_CONTEXT_MAX: u64 = u64::MAX - 4095;

// ============================================================================
// Ring Buffer Record Types
// ============================================================================

/// **Lost records**: the kernel dropped records because the consumer lagged
///
/// Layout after the header: `{ u64 id; u64 lost; }`
pub const PERF_RECORD_LOST: u32 = 2;

/// **Sample**: one sampling interrupt
///
/// With `PERF_SAMPLE_CALLCHAIN` only, the layout after the header is
/// `{ u64 nr; u64 ips[nr]; }`.
pub const PERF_RECORD_SAMPLE: u32 = 9;

/// Returns true if `addr` is a callchain context marker rather than a frame
#[must_use]
pub const fn is_context_marker(addr: u64) -> bool {
    addr >= PERF_CONTEXT_MAX
}

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Header preceding every record in the kernel ring buffer
///
/// **Memory Layout**: matches `struct perf_event_header` (8 bytes).
/// `size` covers the header itself plus the record body.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerfEventHeader {
    /// Record type (`PERF_RECORD_SAMPLE`, `PERF_RECORD_LOST`, ...)
    pub kind: u32,

    /// Miscellaneous flags (CPU mode of the sample)
    pub misc: u16,

    /// Total record size in bytes, header included
    pub size: u16,
}

impl PerfEventHeader {
    /// Size of the encoded header in bytes
    pub const SIZE: usize = 8;

    /// Decode a header from its native-endian byte representation
    #[must_use]
    pub fn from_ne_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            kind: u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            misc: u16::from_ne_bytes([bytes[4], bytes[5]]),
            size: u16::from_ne_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Encode the header as the kernel would lay it out
    #[must_use]
    pub fn to_ne_bytes(self) -> [u8; Self::SIZE] {
        let kind = self.kind.to_ne_bytes();
        let misc = self.misc.to_ne_bytes();
        let size = self.size.to_ne_bytes();
        [kind[0], kind[1], kind[2], kind[3], misc[0], misc[1], size[0], size[1]]
    }
}

/// One captured call stack
///
/// Frames are stored deepest first (`ips[0]` is the interrupted
/// instruction). Only the first `depth` entries are meaningful.
///
/// **Lifecycle**: written once into a Sample Buffer slot, read once by
/// symbolization, then discarded.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawSample {
    /// Instruction pointers, deepest frame first
    pub ips: [u64; MAX_STACK_DEPTH],

    /// Number of valid entries in `ips`
    pub depth: u32,

    /// Whether frames beyond `MAX_STACK_DEPTH` were dropped (1) or not (0)
    pub truncated: u8,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 3],
}

impl RawSample {
    /// An empty sample, usable as pre-allocated slot storage
    pub const EMPTY: Self =
        Self { ips: [0; MAX_STACK_DEPTH], depth: 0, truncated: 0, _padding: [0; 3] };

    /// Build a sample from a frame slice, truncating to `MAX_STACK_DEPTH`
    #[must_use]
    pub fn from_frames(frames: &[u64]) -> Self {
        let mut sample = Self::EMPTY;
        let depth = if frames.len() > MAX_STACK_DEPTH { MAX_STACK_DEPTH } else { frames.len() };
        sample.ips[..depth].copy_from_slice(&frames[..depth]);
        #[allow(clippy::cast_possible_truncation)]
        {
            sample.depth = depth as u32;
        }
        sample.truncated = u8::from(frames.len() > MAX_STACK_DEPTH);
        sample
    }

    /// The captured frames, deepest first
    #[must_use]
    pub fn frames(&self) -> &[u64] {
        let depth = self.depth as usize;
        &self.ips[..if depth > MAX_STACK_DEPTH { MAX_STACK_DEPTH } else { depth }]
    }

    /// Whether the capture hit the depth limit
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated != 0
    }
}

impl core::fmt::Debug for RawSample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawSample")
            .field("frames", &self.frames())
            .field("truncated", &self.is_truncated())
            .finish()
    }
}

impl PartialEq for RawSample {
    fn eq(&self, other: &Self) -> bool {
        self.frames() == other.frames() && self.truncated == other.truncated
    }
}

impl Eq for RawSample {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_byte_layout() {
        let header = PerfEventHeader { kind: PERF_RECORD_SAMPLE, misc: 2, size: 40 };
        assert_eq!(PerfEventHeader::from_ne_bytes(header.to_ne_bytes()), header);
        assert_eq!(core::mem::size_of::<PerfEventHeader>(), PerfEventHeader::SIZE);
    }

    #[test]
    fn test_raw_sample_truncates() {
        let frames = [7u64; MAX_STACK_DEPTH + 3];
        let sample = RawSample::from_frames(&frames);
        assert_eq!(sample.frames().len(), MAX_STACK_DEPTH);
        assert!(sample.is_truncated());

        let short = RawSample::from_frames(&[1, 2, 3]);
        assert_eq!(short.frames(), &[1, 2, 3]);
        assert!(!short.is_truncated());
    }

    #[test]
    fn test_context_markers() {
        assert!(is_context_marker(u64::MAX));
        assert!(is_context_marker(PERF_CONTEXT_MAX));
        assert!(!is_context_marker(PERF_CONTEXT_MAX - 1));
        assert!(!is_context_marker(KERNEL_SPACE_START));
    }
}
