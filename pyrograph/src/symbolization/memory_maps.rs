//! Address-space map parsing for symbol resolution
//!
//! Parses `/proc/<pid>/maps` into the ordered table of executable,
//! file-backed regions the Symbol Resolver scans. The table is built once
//! per session; mapping changes after that point are not tracked.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Pid, ProfilerError};

/// Upper bound on regions kept per process
pub const MAX_REGIONS: usize = 4096;

const DELETED_SUFFIX: &str = " (deleted)";

/// One executable, file-backed mapping of the profiled process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpaceRegion {
    pub start: u64,
    pub end: u64,
    /// Offset of `start` within the backing file
    pub offset: u64,
    pub permissions: String,
    pub path: PathBuf,
}

impl AddressSpaceRegion {
    /// Check if an address falls within this region (`[start, end)`)
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Translate a runtime address inside this region to a file offset
    #[must_use]
    pub fn file_offset(&self, addr: u64) -> u64 {
        addr - self.start + self.offset
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read and parse the address-space map of `pid`
///
/// # Errors
/// [`ProfilerError::MemoryMapsReadFailed`] if the maps file cannot be read
/// (process gone, or insufficient permissions).
pub fn parse_memory_maps(pid: Pid) -> Result<Vec<AddressSpaceRegion>, ProfilerError> {
    let maps_path = pid.maps_path();
    let maps = fs::read_to_string(&maps_path)
        .map_err(|source| ProfilerError::MemoryMapsReadFailed { path: maps_path.clone(), source })?;

    let regions = parse_maps(&maps);
    debug!("{maps_path}: {} executable file-backed regions", regions.len());
    Ok(regions)
}

/// Parse the text of a maps file
///
/// Keeps executable mappings whose path is absolute, in file order.
/// Malformed lines are skipped.
#[must_use]
pub fn parse_maps(text: &str) -> Vec<AddressSpaceRegion> {
    let mut regions = Vec::new();

    for line in text.lines() {
        let Some(region) = parse_line(line) else {
            continue;
        };
        if regions.len() == MAX_REGIONS {
            warn!("Address-space map has more than {MAX_REGIONS} executable regions, ignoring the rest");
            break;
        }
        regions.push(region);
    }

    regions
}

/// Parse one line: `start-end perms offset dev inode   pathname`
fn parse_line(line: &str) -> Option<AddressSpaceRegion> {
    let mut fields = line.splitn(6, char::is_whitespace);
    let range = fields.next()?;
    let permissions = fields.next()?;
    let offset = fields.next()?;
    let _device = fields.next()?;
    let _inode = fields.next()?;
    let path = fields.next().unwrap_or("").trim_start();

    if permissions.as_bytes().get(2) != Some(&b'x') || !path.starts_with('/') {
        return None;
    }

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    let offset = u64::from_str_radix(offset, 16).ok()?;
    if end <= start {
        return None;
    }

    let path = path.strip_suffix(DELETED_SUFFIX).unwrap_or(path);
    Some(AddressSpaceRegion {
        start,
        end,
        offset,
        permissions: permissions.to_string(),
        path: PathBuf::from(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MAPS: &str = "\
55d0c8a00000-55d0c8a02000 r--p 00000000 fd:01 1234   /usr/bin/workload
55d0c8a02000-55d0c8a05000 r-xp 00002000 fd:01 1234   /usr/bin/workload
55d0c9000000-55d0c9021000 rw-p 00000000 00:00 0      [heap]
7f1a2b000000-7f1a2b1b0000 r-xp 00028000 fd:01 5678   /usr/lib/x86_64-linux-gnu/libc.so.6
7f1a2c000000-7f1a2c001000 r-xp 00000000 00:00 0
7ffd1e3fe000-7ffd1e400000 r-xp 00000000 00:00 0      [vdso]
garbage line
7f1a2d000000-7f1a2d004000 r-xp 00001000 fd:01 9999   /tmp/old binary (deleted)
";

    #[test]
    fn test_region_contains() {
        let region = AddressSpaceRegion {
            start: 0x1000,
            end: 0x2000,
            offset: 0,
            permissions: "r-xp".into(),
            path: "/bin/x".into(),
        };

        assert!(region.contains(0x1000));
        assert!(region.contains(0x1FFF));
        assert!(!region.contains(0x0FFF));
        assert!(!region.contains(0x2000));
    }

    #[test]
    fn test_file_offset_adds_mapping_offset() {
        let region = AddressSpaceRegion {
            start: 0x55d0_c8a0_2000,
            end: 0x55d0_c8a0_5000,
            offset: 0x2000,
            permissions: "r-xp".into(),
            path: "/usr/bin/workload".into(),
        };
        assert_eq!(region.file_offset(0x55d0_c8a0_2780), 0x2780);
    }

    #[test]
    fn test_parse_keeps_only_executable_file_backed() {
        let regions = parse_maps(SAMPLE_MAPS);
        let paths: Vec<&str> = regions.iter().map(|r| r.path.to_str().unwrap()).collect();
        assert_eq!(
            paths,
            vec!["/usr/bin/workload", "/usr/lib/x86_64-linux-gnu/libc.so.6", "/tmp/old binary"]
        );
        assert_eq!(regions[0].offset, 0x2000);
        assert_eq!(regions[0].permissions, "r-xp");
    }

    #[test]
    fn test_parse_caps_region_count() {
        let line = "1000-2000 r-xp 00000000 fd:01 1 /bin/x\n";
        let regions = parse_maps(&line.repeat(MAX_REGIONS + 5));
        assert_eq!(regions.len(), MAX_REGIONS);
    }

    #[test]
    fn test_parse_memory_maps_self() {
        // Depends on /proc being mounted; only check the call is well-formed
        if let Ok(regions) = parse_memory_maps(Pid::current()) {
            assert!(regions.iter().all(|r| r.permissions.as_bytes()[2] == b'x'));
        }
    }

    #[test]
    fn test_missing_process_is_an_error() {
        let result = parse_memory_maps(Pid(i32::MAX));
        assert!(matches!(result, Err(ProfilerError::MemoryMapsReadFailed { .. })));
    }
}
