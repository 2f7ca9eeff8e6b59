use pyrograph::aggregation::{FrameFilter, StackFolder};
use pyrograph::profiling::{InMemoryRing, RingMemory, RingReader, SampleBuffer};
use pyrograph::symbolization::{AddressSpaceRegion, CacheConfig, OffsetResolver, SymbolResolver};
use std::path::{Path, PathBuf};

/// Callchain marker the kernel puts before user-space frames
const PERF_CONTEXT_USER: u64 = u64::MAX - 511;

/// Names each 0x100-byte block from 0x100 up: fn_1, fn_2, ...
struct OffsetNames;

impl OffsetResolver for OffsetNames {
    fn resolve_offset(&mut self, _path: &Path, offset: u64) -> Option<String> {
        (offset >= 0x100).then(|| format!("fn_{}", offset / 0x100))
    }
}

fn app_region() -> AddressSpaceRegion {
    AddressSpaceRegion {
        start: 0x40_0000,
        end: 0x50_0000,
        offset: 0,
        permissions: "r-xp".into(),
        path: PathBuf::from("/opt/app"),
    }
}

#[test]
fn test_records_across_wrap_fold_correctly() {
    // 256-byte ring; cursors start 32 bytes before the end so the first
    // 40-byte record straddles the boundary
    let mut ring = InMemoryRing::new(256).starting_at(224);
    ring.write_sample(&[0x40_0300, 0x40_0210, 0x40_0110]);
    ring.write_sample(&[PERF_CONTEXT_USER, 0x40_0300, 0x40_0210, 0x40_0110]);
    ring.write_lost(3);
    ring.write_sample(&[0x40_0200, 0x40_0110]);

    let reader = RingReader::new(ring).expect("power of two");
    let buffer = SampleBuffer::with_capacity(16);
    let stats = reader.drain(&buffer);

    assert_eq!(stats.records, 4);
    assert_eq!(stats.samples, 3);
    assert_eq!(stats.lost, 3);
    assert_eq!(stats.sentinels_skipped, 1);
    assert_eq!(stats.discarded_bytes, 0);
    assert_eq!(reader.memory().load_tail(), reader.memory().load_head());
    assert!(!reader.has_pending());

    let mut resolver = SymbolResolver::new(vec![app_region()], OffsetNames, CacheConfig::default());
    let mut folder = StackFolder::new(FrameFilter::sentinels());
    for sample in buffer.iter() {
        folder.add_sample(&mut resolver, sample);
    }
    let folded = folder.finish();

    assert_eq!(folded.count_of("fn_1;fn_2;fn_3"), 2);
    assert_eq!(folded.count_of("fn_1;fn_2"), 1);
    assert_eq!(folded.total_samples(), 3);
}

#[test]
fn test_full_buffer_discards_rest_of_window() {
    let mut ring = InMemoryRing::new(512);
    for _ in 0..5 {
        ring.write_sample(&[0x40_0100]);
    }

    let reader = RingReader::new(ring).expect("power of two");
    let buffer = SampleBuffer::with_capacity(2);
    let stats = reader.drain(&buffer);

    assert_eq!(stats.samples, 2);
    assert_eq!(buffer.len(), 2);
    assert!(stats.discarded_bytes > 0);
    // The window is consumed even though records were dropped
    assert!(!reader.has_pending());
}

#[test]
fn test_non_power_of_two_ring_is_rejected() {
    assert!(RingReader::new(InMemoryRing::new(300)).is_err());
}
