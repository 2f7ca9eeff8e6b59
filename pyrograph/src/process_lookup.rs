//! Picking the process to record
//!
//! A [`Target`] is the PID handed to the perf source plus the executable
//! that preflight inspects for symbols. It comes either from an explicit PID
//! or from a name matched against every process in `/proc`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::{Pid, ProfilerError};

/// The process a `record` session attaches to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub pid: Pid,
    /// Resolved `/proc/<pid>/exe`
    pub exe: PathBuf,
}

impl Target {
    /// Target for a known PID
    ///
    /// # Errors
    /// - [`ProfilerError::ProcessNotFound`] if no such process exists
    /// - [`ProfilerError::Io`] if its executable link is unreadable
    pub fn from_pid(pid: Pid) -> Result<Self, ProfilerError> {
        match fs::read_link(format!("/proc/{}/exe", pid.0)) {
            Ok(exe) => Ok(Self { pid, exe }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProfilerError::ProcessNotFound(pid)),
            Err(e) => Err(ProfilerError::Io(e)),
        }
    }

    /// The single running process whose command or executable name matches
    /// `name`
    ///
    /// An exact match on either name wins over substring matches. This
    /// process is never a candidate.
    ///
    /// # Errors
    /// Fails when nothing matches, or when several processes match equally
    /// well.
    pub fn find(name: &str) -> Result<Self> {
        let wanted = Path::new(name).file_name().and_then(|n| n.to_str()).unwrap_or(name);
        let own = Pid::current();

        let mut exact = Vec::new();
        let mut partial = Vec::new();
        for candidate in running_processes()?.filter(|c| c.target.pid != own) {
            match candidate.rank(wanted) {
                Some(MatchRank::Exact) => exact.push(candidate),
                Some(MatchRank::Partial) => partial.push(candidate),
                None => {}
            }
        }

        let mut best = if exact.is_empty() { partial } else { exact };
        match best.len() {
            0 => bail!("No running process is named like '{name}' (see: pgrep -a {name})"),
            1 => Ok(best.remove(0).target),
            _ => {
                let listing: Vec<String> =
                    best.iter().map(|c| format!("  {:>7}  {}", c.target.pid.0, c.comm)).collect();
                bail!(
                    "'{name}' matches {} processes:\n{}\n\nPick one with: pyrograph record --pid <PID>",
                    best.len(),
                    listing.join("\n")
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchRank {
    Exact,
    Partial,
}

/// A user process visible in `/proc`
#[derive(Debug)]
struct Candidate {
    target: Target,
    comm: String,
}

impl Candidate {
    fn rank(&self, wanted: &str) -> Option<MatchRank> {
        let exe_name = self.target.exe.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.comm == wanted || exe_name == wanted {
            Some(MatchRank::Exact)
        } else if self.comm.contains(wanted) || exe_name.contains(wanted) {
            Some(MatchRank::Partial)
        } else {
            None
        }
    }
}

/// Every process with a readable executable link (kernel threads have none)
fn running_processes() -> Result<impl Iterator<Item = Candidate>> {
    let entries = fs::read_dir("/proc").context("Failed to list /proc")?;
    Ok(entries.flatten().filter_map(|entry| {
        let pid = Pid(entry.file_name().to_str()?.parse().ok()?);
        let target = Target::from_pid(pid).ok()?;
        let stat = fs::read_to_string(format!("/proc/{}/stat", pid.0)).ok()?;
        let comm = comm_from_stat(&stat)?.to_string();
        Some(Candidate { target, comm })
    }))
}

/// Command name from a `/proc/<pid>/stat` line: `pid (comm) state ...`
///
/// The name may itself contain parentheses, so it runs to the last `)`.
fn comm_from_stat(stat: &str) -> Option<&str> {
    let (_, rest) = stat.split_once('(')?;
    let (comm, _) = rest.rsplit_once(')')?;
    Some(comm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(comm: &str, exe: &str) -> Candidate {
        Candidate { target: Target { pid: Pid(1), exe: PathBuf::from(exe) }, comm: comm.into() }
    }

    #[test]
    fn test_comm_from_stat() {
        assert_eq!(comm_from_stat("1234 (my-app) S 1 1234 1234 0 -1"), Some("my-app"));
        assert_eq!(comm_from_stat("1234 (app (v2)) S 1 1234"), Some("app (v2)"));
        assert_eq!(comm_from_stat("garbage"), None);
    }

    #[test]
    fn test_rank_prefers_exact_names() {
        let server = candidate("my-server", "/usr/bin/my-server");
        assert_eq!(server.rank("my-server"), Some(MatchRank::Exact));
        assert_eq!(server.rank("server"), Some(MatchRank::Partial));
        assert_eq!(server.rank("other"), None);

        // comm is truncated to 15 bytes; the executable name still matches
        let long = candidate("very-long-proce", "/opt/very-long-process-name");
        assert_eq!(long.rank("very-long-process-name"), Some(MatchRank::Exact));
    }

    #[test]
    fn test_own_pid_target() {
        let target = Target::from_pid(Pid::current()).expect("own process");
        assert_eq!(target.exe, std::env::current_exe().expect("current exe"));
    }

    #[test]
    fn test_missing_pid_is_process_not_found() {
        let result = Target::from_pid(Pid(999_999_999));
        assert!(matches!(result, Err(ProfilerError::ProcessNotFound(Pid(999_999_999)))));
    }

    #[test]
    fn test_unknown_name_is_error() {
        let err = Target::find("pyrograph-no-such-process-name").expect_err("nothing matches");
        assert!(err.to_string().contains("No running process"));
    }
}
