//! Folded-stack model and text format
//!
//! One line per distinct stack, frames root-first:
//!
//! ```text
//! main;run;compute_hot 712
//! main;run;compute_medium 203
//! ```
//!
//! Reading is lenient: blank lines, `#` comments, lines without a space,
//! lines whose trailing token is not a positive integer and lines with an
//! empty frame path are skipped and counted. Duplicate paths are merged.
//! Writing is in sorted path order, so output for the same data is stable.

use log::debug;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use crate::domain::FoldError;

/// Separator between frame names in a folded path
pub const FRAME_SEPARATOR: char = ';';

/// One distinct stack and how often it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedStack<'a> {
    /// Frame names, root first
    pub path: &'a str,
    pub count: u64,
}

impl<'a> FoldedStack<'a> {
    /// Frame names, root first
    pub fn frames(&self) -> impl Iterator<Item = &'a str> {
        self.path.split(FRAME_SEPARATOR)
    }
}

/// The deduplicated, counted set of stacks for one profile
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FoldedStacks {
    stacks: BTreeMap<String, u64>,
    skipped_lines: u64,
}

impl FoldedStacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` observations of a root-first frame list
    ///
    /// Empty frame names are dropped; a path with no names left (or a zero
    /// count) is ignored. Returns whether anything was added.
    pub fn add_frames<I, S>(&mut self, frames: I, count: u64) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = String::new();
        for frame in frames {
            let frame = frame.as_ref();
            if frame.is_empty() {
                continue;
            }
            if !path.is_empty() {
                path.push(FRAME_SEPARATOR);
            }
            path.push_str(frame);
        }
        self.add_path(path, count)
    }

    /// Add `count` observations of an already-joined path
    pub fn add_path(&mut self, path: String, count: u64) -> bool {
        if path.is_empty() || count == 0 {
            return false;
        }
        *self.stacks.entry(path).or_insert(0) += count;
        true
    }

    /// Parse folded text from a reader
    ///
    /// # Errors
    /// [`FoldError::Read`] if the reader fails. Malformed lines are not
    /// errors.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, FoldError> {
        let mut folded = Self::new();
        for line in reader.lines() {
            folded.parse_line(&line.map_err(FoldError::Read)?);
        }
        debug!(
            "Parsed {} distinct stacks ({} samples), skipped {} lines",
            folded.len(),
            folded.total_samples(),
            folded.skipped_lines
        );
        Ok(folded)
    }

    /// Parse folded text held in memory
    #[must_use]
    pub fn parse_str(text: &str) -> Self {
        let mut folded = Self::new();
        for line in text.lines() {
            folded.parse_line(line);
        }
        folded
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        let parsed = line.rsplit_once(' ').and_then(|(path, count)| {
            let count = count.parse::<u64>().ok().filter(|c| *c > 0)?;
            Some((path, count))
        });

        let added = match parsed {
            Some((path, count)) => self.add_frames(path.trim().split(FRAME_SEPARATOR), count),
            None => false,
        };
        if !added {
            self.skipped_lines += 1;
        }
    }

    /// Write `path count` lines in sorted path order
    ///
    /// # Errors
    /// [`FoldError::Write`] if the writer fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), FoldError> {
        for (path, count) in &self.stacks {
            writeln!(writer, "{path} {count}").map_err(FoldError::Write)?;
        }
        writer.flush().map_err(FoldError::Write)
    }

    /// Stacks in sorted path order
    pub fn iter(&self) -> impl Iterator<Item = FoldedStack<'_>> {
        self.stacks.iter().map(|(path, &count)| FoldedStack { path, count })
    }

    /// Observation count of one path (0 if absent)
    #[must_use]
    pub fn count_of(&self, path: &str) -> u64 {
        self.stacks.get(path).copied().unwrap_or(0)
    }

    /// Sum of all counts
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.stacks.values().sum()
    }

    /// Number of distinct stacks
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Input lines ignored while parsing
    #[must_use]
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merges_duplicates() {
        let folded = FoldedStacks::parse_str("a;b 2\na;b 3\na;c 1\n");
        assert_eq!(folded.len(), 2);
        assert_eq!(folded.count_of("a;b"), 5);
        assert_eq!(folded.total_samples(), 6);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "\
# comment

a;b 4
no_count_here
a;b;c zero
a;b;c 0
a;b;c -3
;; 7
a;d 1
";
        let folded = FoldedStacks::parse_str(text);
        assert_eq!(folded.total_samples(), 5);
        // blank and comment lines are ignored, not counted as skipped
        assert_eq!(folded.skipped_lines(), 5);
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        let folded = FoldedStacks::parse_str("a;;b; 2\n");
        assert_eq!(folded.count_of("a;b"), 2);
    }

    #[test]
    fn test_frame_names_may_contain_spaces() {
        let folded = FoldedStacks::parse_str("main;<T as core::ops::Fn>::call 9\n");
        let stack = folded.iter().next().expect("one stack");
        assert_eq!(stack.frames().collect::<Vec<_>>(), vec!["main", "<T as core::ops::Fn>::call"]);
        assert_eq!(stack.count, 9);
    }

    #[test]
    fn test_crlf_line_endings() {
        let folded = FoldedStacks::parse_str("a;b 2\r\na 1\r\n");
        assert_eq!(folded.total_samples(), 3);
        assert_eq!(folded.skipped_lines(), 0);
    }

    #[test]
    fn test_write_is_sorted() {
        let mut folded = FoldedStacks::new();
        folded.add_frames(["z"], 1);
        folded.add_frames(["a", "b"], 2);
        folded.add_frames(["a"], 3);

        let mut out = Vec::new();
        folded.write_to(&mut out).expect("write to vec");
        assert_eq!(String::from_utf8(out).expect("utf8"), "a 3\na;b 2\nz 1\n");
    }

    #[test]
    fn test_add_rejects_empty() {
        let mut folded = FoldedStacks::new();
        assert!(!folded.add_frames(Vec::<&str>::new(), 1));
        assert!(!folded.add_frames(["", ""], 1));
        assert!(!folded.add_frames(["a"], 0));
        assert!(folded.is_empty());
    }
}
