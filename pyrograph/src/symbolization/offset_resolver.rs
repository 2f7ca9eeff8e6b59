//! Pluggable `(file, offset) -> function name` lookup
//!
//! The Symbol Resolver only needs one capability from the outside world:
//! name the function at a byte offset inside a binary. Two implementations
//! ship with the crate:
//!
//! - [`Addr2LineCommand`]: runs the `addr2line` tool per lookup
//! - [`DwarfResolver`](super::DwarfResolver): reads DWARF and symbol tables
//!   in-process

use log::{debug, warn};
use std::path::Path;
use std::process::{Command, Stdio};

/// Maps a byte offset inside a binary to a function name
pub trait OffsetResolver {
    /// Returns `None` when the name cannot be determined
    fn resolve_offset(&mut self, path: &Path, offset: u64) -> Option<String>;
}

impl<T: OffsetResolver + ?Sized> OffsetResolver for Box<T> {
    fn resolve_offset(&mut self, path: &Path, offset: u64) -> Option<String> {
        (**self).resolve_offset(path, offset)
    }
}

/// Token `addr2line` prints when it has no answer
const NOT_FOUND: &str = "??";

/// Resolves through the external `addr2line` program (`-f -C -e`)
#[derive(Debug)]
pub struct Addr2LineCommand {
    program: String,
    unavailable: bool,
}

impl Addr2LineCommand {
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("addr2line")
    }

    /// Use a different executable (e.g. a cross `addr2line`)
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into(), unavailable: false }
    }
}

impl Default for Addr2LineCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetResolver for Addr2LineCommand {
    fn resolve_offset(&mut self, path: &Path, offset: u64) -> Option<String> {
        if self.unavailable {
            return None;
        }

        let output = Command::new(&self.program)
            .args(["-f", "-C", "-e"])
            .arg(path)
            .arg(format!("0x{offset:x}"))
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Cannot run {}: {e}; symbols will be unresolved", self.program);
                self.unavailable = true;
                return None;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let name = stdout.lines().next().map(str::trim).unwrap_or_default();
        if name.is_empty() || name == NOT_FOUND {
            debug!("{}+0x{offset:x}: not found", path.display());
            return None;
        }
        Some(name.to_string())
    }
}
