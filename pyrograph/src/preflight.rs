//! Pre-flight checks for pyrograph
//!
//! Validates system requirements before opening a perf event on another
//! process. Provides clear, actionable error messages when requirements
//! aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{Context, Result};
use log::debug;
use object::{Object, ObjectSection};
use std::path::Path;

use crate::domain::{Pid, ProfilerError};

const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Highest `perf_event_paranoid` level that still lets an unprivileged
/// user sample their own processes
const MAX_UNPRIVILEGED_PARANOID: i32 = 2;

/// Run all pre-flight checks for recording `pid`
///
/// # Errors
/// Fails if the process is gone or its memory maps are unreadable.
pub fn run_preflight_checks(pid: Pid, exe_path: &Path) -> Result<()> {
    check_process_exists(pid)
        .with_context(|| format!("Is the process still running? Check with: ps -p {}", pid.0))?;
    check_proc_access(pid)?;
    check_perf_permissions();
    check_debug_symbols(exe_path)?;
    Ok(())
}

/// Check if the target process exists
///
/// # Errors
/// [`ProfilerError::ProcessNotFound`] if `/proc/<pid>` is gone.
pub fn check_process_exists(pid: Pid) -> Result<(), ProfilerError> {
    if Path::new(&format!("/proc/{}", pid.0)).exists() {
        Ok(())
    } else {
        Err(ProfilerError::ProcessNotFound(pid))
    }
}

/// Check if we can read the process's memory maps
pub fn check_proc_access(pid: Pid) -> Result<()> {
    let maps_path = pid.maps_path();
    std::fs::read_to_string(&maps_path).with_context(|| {
        format!(
            "Cannot read {maps_path}\n\n\
             This usually means:\n\
             - The process doesn't exist (check: ps -p {})\n\
             - Permission denied (run with sudo)\n\
             - /proc is not mounted",
            pid.0
        )
    })?;
    Ok(())
}

/// Warn when the kernel is likely to refuse an unprivileged perf event
fn check_perf_permissions() {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    match read_paranoid_level() {
        Some(level) if level > MAX_UNPRIVILEGED_PARANOID => {
            eprintln!(
                "warning: perf_event_paranoid is {level}; sampling will likely be denied.\n\
                 Lower it with: sudo sysctl kernel.perf_event_paranoid={MAX_UNPRIVILEGED_PARANOID}"
            );
        }
        Some(level) => debug!("perf_event_paranoid = {level}"),
        None => debug!("{PARANOID_PATH} unreadable"),
    }
}

fn read_paranoid_level() -> Option<i32> {
    parse_paranoid(&std::fs::read_to_string(PARANOID_PATH).ok()?)
}

fn parse_paranoid(content: &str) -> Option<i32> {
    content.trim().parse().ok()
}

/// Check if the binary has symbols for function-name resolution
fn check_debug_symbols(exe_path: &Path) -> Result<()> {
    let file_data = std::fs::read(exe_path)
        .with_context(|| format!("Failed to read binary: {}", exe_path.display()))?;

    let Ok(obj) = object::File::parse(&*file_data) else {
        // Not a valid object file, let the resolver report it
        return Ok(());
    };

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    if !has_debug_info && !has_symtab {
        eprintln!("warning: binary stripped, most frames will show as [unknown]");
    } else if !has_debug_info {
        eprintln!("warning: no DWARF debug info, inlined functions will not be named");
    }

    Ok(())
}
