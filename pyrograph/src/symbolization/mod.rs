//! # Symbol Resolution and Address Translation
//!
//! Converts raw instruction pointers captured by a sampling source into
//! human-readable function names. This process is called **symbolization**.
//!
//! ## The Symbolization Problem
//!
//! A stack sample is a list of runtime addresses like `0x55f3a2b4c780`.
//! Because of ASLR, the same instruction lives at a different address on
//! every run, so the address first has to be translated back into a
//! position inside the binary that contains it:
//!
//! ```text
//! /proc/<pid>/maps line:
//!   55f3a2b4c000-55f3a2b5f000 r-xp 00002000 fd:01 1234 /usr/bin/app
//!   start        end          perms offset               path
//!
//! file_offset = addr - start + offset
//!             = 0x55f3a2b4c780 - 0x55f3a2b4c000 + 0x2000 = 0x2780
//! ```
//!
//! The `(path, file_offset)` pair is then handed to an [`OffsetResolver`],
//! which names the function at that offset.
//!
//! ## Resolution Never Fails
//!
//! Every address gets *some* name. Failures fall back to sentinels:
//! - `[null]` for address 0
//! - `[kernel]` for privileged-space addresses
//! - `[unknown]` for everything else
//!
//! ## Module Structure
//!
//! - **`memory_maps`**: parses `/proc/<pid>/maps` into executable,
//!   file-backed [`AddressSpaceRegion`]s
//! - **`symbol_cache`**: bounded open-addressing cache of resolved names
//! - **`offset_resolver`**: the [`OffsetResolver`] trait and the external
//!   `addr2line` implementation
//! - **`symbolizer`**: in-process DWARF/ELF symbol table implementation
//!   (`addr2line`, `gimli`, `object`, `rustc-demangle`)
//! - **`resolver`**: the [`SymbolResolver`] tying the above together
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut resolver = SymbolResolver::for_process(pid, DwarfResolver::new(), CacheConfig::default())?;
//! let name = resolver.resolve(0x55f3a2b4c780);
//! // name == "app::worker::run"
//! ```
//!
//! ## Limitations
//!
//! - **Static region table**: mappings added after the session starts
//!   (e.g. `dlopen`) resolve to `[unknown]`
//! - **Requires symbols**: stripped binaries without DWARF or a symbol
//!   table resolve to `[unknown]`

pub mod memory_maps;
pub mod offset_resolver;
pub mod resolver;
pub mod symbol_cache;
pub mod symbolizer;

pub use memory_maps::{parse_maps, parse_memory_maps, AddressSpaceRegion};
pub use offset_resolver::{Addr2LineCommand, OffsetResolver};
pub use resolver::{ResolverStats, SymbolResolver, KERNEL_SYMBOL, NULL_SYMBOL, UNKNOWN_SYMBOL};
pub use symbol_cache::{CacheConfig, SymbolCache};
pub use symbolizer::{DwarfResolver, Symbolizer};
