//! The Symbol Resolver: address → frame name, never failing
//!
//! Resolution order for one address:
//!
//! ```text
//! 0                          → "[null]" (not cached)
//! cache hit                  → cached name
//! inside a mapped region     → offset resolver(path, addr - start + offset)
//! no name found:
//!   addr >= kernel threshold → "[kernel]"
//!   otherwise                → "[unknown]"
//! ```
//!
//! Resolved names and sentinels are both cached in the probed slot. When
//! the probe path is contended the name is resolved again on every call.
//!
//! Every frame of a sample except the deepest holds a return address, which
//! points past the call instruction and may already belong to the next
//! inlined function or line. Those frames are looked up at `addr - 1`.

use log::info;
use pyrograph_common::{RawSample, KERNEL_SPACE_START};
use serde::Serialize;
use std::sync::Arc;

use super::memory_maps::{parse_memory_maps, AddressSpaceRegion};
use super::offset_resolver::OffsetResolver;
use super::symbol_cache::{CacheConfig, Probe, SymbolCache};
use crate::domain::{Pid, ProfilerError};

/// Name for address 0
pub const NULL_SYMBOL: &str = "[null]";
/// Name for unresolvable user-space addresses
pub const UNKNOWN_SYMBOL: &str = "[unknown]";
/// Name for privileged (kernel) addresses
pub const KERNEL_SYMBOL: &str = "[kernel]";

/// Resolution counters for one session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Lookups whose probe path was full of other addresses
    pub cache_contended: u64,
    /// Calls made to the offset resolver
    pub external_calls: u64,
    /// Lookups that ended in a sentinel
    pub unresolved: u64,
}

pub struct SymbolResolver<R> {
    regions: Vec<AddressSpaceRegion>,
    lookup: R,
    cache: SymbolCache,
    stats: ResolverStats,
    null: Arc<str>,
    unknown: Arc<str>,
    kernel: Arc<str>,
}

impl<R: OffsetResolver> SymbolResolver<R> {
    /// Resolver over a fixed region table
    #[must_use]
    pub fn new(regions: Vec<AddressSpaceRegion>, lookup: R, cache_config: CacheConfig) -> Self {
        Self {
            regions,
            lookup,
            cache: SymbolCache::new(cache_config),
            stats: ResolverStats::default(),
            null: Arc::from(NULL_SYMBOL),
            unknown: Arc::from(UNKNOWN_SYMBOL),
            kernel: Arc::from(KERNEL_SYMBOL),
        }
    }

    /// Resolver for a live process, reading its address-space map now
    ///
    /// # Errors
    /// Propagates [`ProfilerError::MemoryMapsReadFailed`].
    pub fn for_process(pid: Pid, lookup: R, cache_config: CacheConfig) -> Result<Self, ProfilerError> {
        let regions = parse_memory_maps(pid)?;
        info!("Symbol resolver for {pid}: {} executable regions", regions.len());
        Ok(Self::new(regions, lookup, cache_config))
    }

    /// Name of the function at `addr`
    pub fn resolve(&mut self, addr: u64) -> Arc<str> {
        self.stats.lookups += 1;
        if addr == 0 {
            return Arc::clone(&self.null);
        }

        let probe = self.cache.probe(addr);
        match &probe {
            Probe::Hit(name) => {
                self.stats.cache_hits += 1;
                return Arc::clone(name);
            }
            Probe::Vacant(_) => self.stats.cache_misses += 1,
            Probe::Contended => self.stats.cache_contended += 1,
        }

        let name = self.resolve_uncached(addr);
        if let Probe::Vacant(slot) = probe {
            self.cache.fill(slot, addr, Arc::clone(&name));
        }
        name
    }

    /// Names for every frame of a sample, deepest first
    pub fn resolve_sample(&mut self, sample: &RawSample) -> Vec<Arc<str>> {
        sample
            .frames()
            .iter()
            .enumerate()
            .map(|(index, &addr)| self.resolve(lookup_address(index, addr)))
            .collect()
    }

    fn resolve_uncached(&mut self, addr: u64) -> Arc<str> {
        if let Some(region) = self.regions.iter().find(|r| r.contains(addr)) {
            self.stats.external_calls += 1;
            if let Some(name) = self.lookup.resolve_offset(&region.path, region.file_offset(addr)) {
                return Arc::from(name);
            }
        }

        self.stats.unresolved += 1;
        if addr >= KERNEL_SPACE_START {
            Arc::clone(&self.kernel)
        } else {
            Arc::clone(&self.unknown)
        }
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    #[must_use]
    pub fn regions(&self) -> &[AddressSpaceRegion] {
        &self.regions
    }

    #[must_use]
    pub fn cached_symbols(&self) -> usize {
        self.cache.len()
    }
}

/// Address to look up for the frame at `index` (0 is the sampled leaf)
fn lookup_address(index: usize, addr: u64) -> u64 {
    if index == 0 {
        addr
    } else {
        addr.saturating_sub(1)
    }
}
