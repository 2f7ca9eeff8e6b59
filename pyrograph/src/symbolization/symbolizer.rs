//! In-process offset resolution from DWARF and ELF symbol tables
//!
//! Each backing file is read and parsed once. A file offset is first
//! translated to the virtual address the linker assigned (through the
//! loadable segments), then looked up in DWARF; if DWARF has no function
//! there, the nearest preceding text symbol is used.

use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, RunTimeEndian};
use log::{debug, warn};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::offset_resolver::OffsetResolver;

/// A loadable segment: file bytes `[file_offset, file_offset + file_size)`
/// are mapped at `address`
#[derive(Debug, Clone, Copy)]
struct Segment {
    file_offset: u64,
    file_size: u64,
    address: u64,
}

#[derive(Debug, Clone)]
struct TextSymbol {
    address: u64,
    size: u64,
    name: String,
}

/// Parsed debug and symbol information for one binary
pub struct Symbolizer {
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    segments: Vec<Segment>,
    /// Sorted by address
    symbols: Vec<TextSymbol>,
}

impl Symbolizer {
    /// Load the binary at `binary_path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed as an object
    /// file, or if its DWARF sections are malformed.
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("Failed to read binary file")?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let segments = obj_file
            .segments()
            .map(|segment| {
                let (file_offset, file_size) = segment.file_range();
                Segment { file_offset, file_size, address: segment.address() }
            })
            .collect();

        let mut symbols: Vec<TextSymbol> = obj_file
            .symbols()
            .chain(obj_file.dynamic_symbols())
            .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.address() != 0)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                Some(TextSymbol { address: symbol.address(), size: symbol.size(), name: name.to_string() })
            })
            .collect();
        symbols.sort_by_key(|symbol| symbol.address);
        symbols.dedup_by_key(|symbol| symbol.address);

        Ok(Self { ctx, segments, symbols })
    }

    /// Virtual address of a file offset, per the loadable segments
    ///
    /// Offsets outside every segment are returned unchanged.
    #[must_use]
    pub fn offset_to_address(&self, file_offset: u64) -> u64 {
        self.segments
            .iter()
            .find(|s| file_offset >= s.file_offset && file_offset < s.file_offset + s.file_size)
            .map_or(file_offset, |s| s.address + (file_offset - s.file_offset))
    }

    /// Name of the function containing a file offset
    #[must_use]
    pub fn function_at_offset(&self, file_offset: u64) -> Option<String> {
        let address = self.offset_to_address(file_offset);
        self.dwarf_function(address).or_else(|| self.symbol_function(address))
    }

    /// Innermost (first reported) DWARF function at `address`
    fn dwarf_function(&self, address: u64) -> Option<String> {
        let mut frames = self.ctx.find_frames(address).skip_all_loads().ok()?;
        while let Ok(Some(frame)) = frames.next() {
            if let Some(name) = frame.function.as_ref().and_then(|f| f.raw_name().ok()) {
                return Some(Self::demangle_symbol(&name));
            }
        }
        None
    }

    /// Nearest preceding text symbol covering `address`
    fn symbol_function(&self, address: u64) -> Option<String> {
        let index = self.symbols.partition_point(|s| s.address <= address).checked_sub(1)?;
        let symbol = &self.symbols[index];
        let covers = symbol.size == 0 || address < symbol.address + symbol.size;
        covers.then(|| Self::demangle_symbol(&symbol.name))
    }

    /// Demangle a Rust symbol name (without the hash suffix)
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

/// [`OffsetResolver`] backed by one [`Symbolizer`] per binary
///
/// Binaries that fail to load are remembered so they are only reported once.
#[derive(Default)]
pub struct DwarfResolver {
    binaries: HashMap<PathBuf, Option<Symbolizer>>,
}

impl DwarfResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of binaries loaded successfully
    #[must_use]
    pub fn loaded_binaries(&self) -> usize {
        self.binaries.values().filter(|b| b.is_some()).count()
    }
}

impl OffsetResolver for DwarfResolver {
    fn resolve_offset(&mut self, path: &Path, offset: u64) -> Option<String> {
        let symbolizer = self.binaries.entry(path.to_path_buf()).or_insert_with(|| {
            match Symbolizer::new(path) {
                Ok(symbolizer) => {
                    debug!("Loaded symbols for {}", path.display());
                    Some(symbolizer)
                }
                Err(e) => {
                    warn!("Cannot symbolize {}: {e:#}", path.display());
                    None
                }
            }
        });
        symbolizer.as_ref()?.function_at_offset(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_strips_hash() {
        let name = Symbolizer::demangle_symbol("_ZN4core3ptr13drop_in_place17h0123456789abcdefE");
        assert_eq!(name, "core::ptr::drop_in_place");
        assert_eq!(Symbolizer::demangle_symbol("compute_hot"), "compute_hot");
    }

    #[test]
    fn test_unreadable_binary_is_remembered() {
        let mut resolver = DwarfResolver::new();
        let path = Path::new("/nonexistent/binary");
        assert_eq!(resolver.resolve_offset(path, 0x1000), None);
        assert_eq!(resolver.resolve_offset(path, 0x2000), None);
        assert_eq!(resolver.binaries.len(), 1);
        assert_eq!(resolver.loaded_binaries(), 0);
    }

    #[test]
    fn test_current_exe_loads() {
        let exe = std::env::current_exe().expect("current exe");
        // Test binaries are built with symbols; DWARF may be absent
        let symbolizer = Symbolizer::new(&exe).expect("parse test binary");
        assert!(!symbolizer.segments.is_empty());
    }
}
