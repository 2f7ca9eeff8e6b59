//! Stack Folder: symbolized samples → counted folded stacks
//!
//! Each sample arrives deepest frame first. The folder reverses it to
//! root-first order, drops profiler-infrastructure frames and sentinels,
//! and counts the joined path. Samples left with no frames are discarded.

use log::debug;
use pyrograph_common::RawSample;

use super::folded::{FoldedStacks, FRAME_SEPARATOR};
use crate::symbolization::{OffsetResolver, SymbolResolver, NULL_SYMBOL, UNKNOWN_SYMBOL};

/// Replacement for separator characters inside frame names
const SEPARATOR_REPLACEMENT: char = ':';

/// Frames removed from every sample before folding
#[derive(Debug, Clone, Default)]
pub struct FrameFilter {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl FrameFilter {
    /// Drops only the unresolvable sentinels (`[unknown]`, `[null]`)
    #[must_use]
    pub fn sentinels() -> Self {
        Self { exact: vec![UNKNOWN_SYMBOL.into(), NULL_SYMBOL.into()], prefixes: Vec::new() }
    }

    /// Sentinels plus the signal trampoline, the `SIGPROF` handler and the
    /// unwinder frames it runs
    #[must_use]
    pub fn self_profiling() -> Self {
        Self::sentinels()
            .with_exact("__restore_rt")
            .with_prefix("pyrograph::profiling::timer_sampler::")
            .with_prefix("pyrograph::profiling::sample_buffer::")
            .with_prefix("backtrace::")
            .with_prefix("<backtrace::")
            .with_prefix("_Unwind_")
    }

    #[must_use]
    pub fn with_exact(mut self, name: impl Into<String>) -> Self {
        self.exact.push(name.into());
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    #[must_use]
    pub fn is_filtered(&self, name: &str) -> bool {
        self.exact.iter().any(|e| e == name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Accumulates samples into [`FoldedStacks`]
#[derive(Debug)]
pub struct StackFolder {
    filter: FrameFilter,
    folded: FoldedStacks,
    samples: u64,
    discarded: u64,
}

impl StackFolder {
    #[must_use]
    pub fn new(filter: FrameFilter) -> Self {
        Self { filter, folded: FoldedStacks::new(), samples: 0, discarded: 0 }
    }

    /// Add one sample given as frame names, deepest first
    ///
    /// Returns false if no frames survived filtering.
    pub fn add_stack<S: AsRef<str>>(&mut self, deepest_first: &[S]) -> bool {
        self.samples += 1;

        let frames: Vec<String> = deepest_first
            .iter()
            .rev()
            .map(AsRef::as_ref)
            .filter(|name| !self.filter.is_filtered(name))
            .map(|name| name.replace(FRAME_SEPARATOR, &SEPARATOR_REPLACEMENT.to_string()))
            .collect();

        let added = self.folded.add_frames(&frames, 1);
        if !added {
            self.discarded += 1;
        }
        added
    }

    /// Symbolize and add one raw sample
    pub fn add_sample<R: OffsetResolver>(&mut self, resolver: &mut SymbolResolver<R>, sample: &RawSample) -> bool {
        let names = resolver.resolve_sample(sample);
        self.add_stack(&names)
    }

    /// Samples seen so far (including discarded ones)
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Samples with no frames left after filtering
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    #[must_use]
    pub fn finish(self) -> FoldedStacks {
        debug!(
            "Folded {} samples into {} stacks ({} discarded)",
            self.samples,
            self.folded.len(),
            self.discarded
        );
        self.folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverses_to_root_first() {
        let mut folder = StackFolder::new(FrameFilter::sentinels());
        folder.add_stack(&["leaf", "mid", "main"]);
        folder.add_stack(&["leaf", "mid", "main"]);
        folder.add_stack(&["other", "main"]);

        let folded = folder.finish();
        assert_eq!(folded.count_of("main;mid;leaf"), 2);
        assert_eq!(folded.count_of("main;other"), 1);
    }

    #[test]
    fn test_sentinels_are_dropped() {
        let mut folder = StackFolder::new(FrameFilter::sentinels());
        folder.add_stack(&["[unknown]", "work", "[null]", "main"]);
        assert_eq!(folder.finish().count_of("main;work"), 1);
    }

    #[test]
    fn test_all_filtered_sample_is_discarded() {
        let mut folder = StackFolder::new(FrameFilter::sentinels());
        assert!(!folder.add_stack(&["[unknown]", "[null]"]));
        assert_eq!(folder.samples(), 1);
        assert_eq!(folder.discarded(), 1);
        assert!(folder.finish().is_empty());
    }

    #[test]
    fn test_self_profiling_filter() {
        let filter = FrameFilter::self_profiling();
        assert!(filter.is_filtered("__restore_rt"));
        assert!(filter.is_filtered("pyrograph::profiling::timer_sampler::on_sigprof"));
        assert!(filter.is_filtered("backtrace::backtrace::libunwind::trace"));
        assert!(!filter.is_filtered("pyrograph::profiling::workload::compute_hot"));
        assert!(!filter.is_filtered("[kernel]"));
    }

    #[test]
    fn test_separator_in_frame_name_is_replaced() {
        let mut folder = StackFolder::new(FrameFilter::sentinels());
        folder.add_stack(&["<[u8; 32] as Debug>::fmt", "main"]);
        assert_eq!(folder.finish().count_of("main;<[u8: 32] as Debug>::fmt"), 1);
    }
}
