//! Bounded address → name cache
//!
//! Open addressing over a fixed power-of-two table with a short linear
//! probe. Entries are never evicted or invalidated during a session. When
//! every probed slot holds a different address the lookup is reported as
//! [`Probe::Contended`] and the caller resolves without caching.

use std::sync::Arc;

/// Multiplicative hashing constant (Knuth)
const HASH_MULTIPLIER: u64 = 2_654_435_761;

/// Cache sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Table size (rounded up to a power of two)
    pub slots: usize,
    /// Maximum linear-probe steps per lookup
    pub probes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { slots: 65_536, probes: 16 }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    address: u64,
    name: Arc<str>,
}

/// Result of probing the cache for an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A valid entry for exactly this address
    Hit(Arc<str>),
    /// First empty slot on the probe path; fill it after resolving
    Vacant(usize),
    /// All probed slots hold other addresses
    Contended,
}

#[derive(Debug)]
pub struct SymbolCache {
    entries: Box<[Option<CacheEntry>]>,
    mask: usize,
    probes: usize,
    filled: usize,
}

impl SymbolCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let slots = config.slots.max(1).next_power_of_two();
        Self {
            entries: vec![None; slots].into_boxed_slice(),
            mask: slots - 1,
            probes: config.probes.clamp(1, slots),
            filled: 0,
        }
    }

    /// Home slot of an address
    #[allow(clippy::cast_possible_truncation)]
    fn home(&self, address: u64) -> usize {
        (address.wrapping_mul(HASH_MULTIPLIER) as u32) as usize & self.mask
    }

    pub fn probe(&self, address: u64) -> Probe {
        let home = self.home(address);
        for step in 0..self.probes {
            let slot = (home + step) & self.mask;
            match &self.entries[slot] {
                None => return Probe::Vacant(slot),
                Some(entry) if entry.address == address => return Probe::Hit(Arc::clone(&entry.name)),
                Some(_) => {}
            }
        }
        Probe::Contended
    }

    /// Store a resolved name in a slot returned by [`Probe::Vacant`]
    pub fn fill(&mut self, slot: usize, address: u64, name: Arc<str>) {
        if let Some(entry) = self.entries.get_mut(slot) {
            if entry.is_none() {
                self.filled += 1;
            }
            *entry = Some(CacheEntry { address, name });
        }
    }

    /// Number of valid entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
