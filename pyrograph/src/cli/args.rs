//! CLI argument definitions

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::profiling::workload::DEFAULT_ITERATIONS;
use crate::profiling::{SessionConfig, DEFAULT_EXTERNAL_FREQUENCY_HZ, DEFAULT_SELF_FREQUENCY_HZ};
use crate::render::{LayoutConfig, SvgOptions};

#[derive(Parser, Debug)]
#[command(
    name = "pyrograph",
    version,
    about = "Sampling profiler that draws flame graphs",
    after_help = "\
EXAMPLES:
    pyrograph record my-app --svg out.svg        Sample a process by name for 5s
    pyrograph record --pid 1234 -o app.folded    Write folded stacks only
    pyrograph self-profile --svg self.svg        Profile the built-in workload
    pyrograph render -i app.folded -o app.svg    Render an existing profile
    pyrograph diff before.folded after.folded -o diff.svg"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample a running process through perf events
    Record(RecordArgs),
    /// Profile pyrograph's own built-in workload with a CPU timer
    SelfProfile(SelfProfileArgs),
    /// Render folded stacks as an SVG flame graph
    Render(RenderArgs),
    /// Render a before/after differential flame graph
    Diff(DiffArgs),
}

/// How instruction offsets are turned into function names
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolverKind {
    /// In-process DWARF and symbol table reader
    #[default]
    Dwarf,
    /// External `addr2line` binary (one process per lookup)
    Addr2line,
}

/// Title and width shared by every command that draws
#[derive(ClapArgs, Debug, Clone)]
pub struct GraphArgs {
    /// Graph title
    #[arg(long, default_value = "Flame Graph")]
    pub title: String,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 1200)]
    pub width: u32,
}

impl GraphArgs {
    #[must_use]
    pub fn svg_options(&self) -> SvgOptions {
        SvgOptions { title: self.title.clone(), layout: LayoutConfig::default().with_width(self.width) }
    }
}

#[derive(ClapArgs, Debug)]
pub struct RecordArgs {
    /// Process name to profile (auto-detects PID)
    #[arg(value_name = "PROCESS", conflicts_with = "pid")]
    pub process: Option<String>,

    /// Process ID to profile
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// Seconds to record
    #[arg(short, long, default_value_t = 5)]
    pub duration: u64,

    /// Sampling frequency in Hz
    #[arg(short = 'F', long, default_value_t = DEFAULT_EXTERNAL_FREQUENCY_HZ)]
    pub frequency: u32,

    /// Perf ring buffer data pages (power of two)
    #[arg(long, default_value_t = 128)]
    pub mmap_pages: usize,

    /// Sample Buffer capacity
    #[arg(long, default_value_t = 500_000)]
    pub max_samples: usize,

    #[arg(long, value_enum, default_value_t = ResolverKind::Dwarf)]
    pub resolver: ResolverKind,

    /// Write folded stacks here (stdout if neither --output nor --svg)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write an SVG flame graph here
    #[arg(long, value_name = "FILE")]
    pub svg: Option<PathBuf>,

    /// Write the session summary as JSON here
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    #[command(flatten)]
    pub graph: GraphArgs,
}

impl RecordArgs {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frequency_hz: self.frequency,
            duration: Duration::from_secs(self.duration),
            max_samples: self.max_samples,
            data_pages: self.mmap_pages,
            ..SessionConfig::external()
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct SelfProfileArgs {
    /// Workload iterations
    #[arg(short = 'n', long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u32,

    /// Sampling frequency in Hz
    #[arg(short = 'F', long, default_value_t = DEFAULT_SELF_FREQUENCY_HZ)]
    pub frequency: u32,

    /// Sample Buffer capacity
    #[arg(long, default_value_t = 100_000)]
    pub max_samples: usize,

    /// Write folded stacks here (stdout if neither --output nor --svg)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write an SVG flame graph here
    #[arg(long, value_name = "FILE")]
    pub svg: Option<PathBuf>,

    /// Write the session summary as JSON here
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    #[command(flatten)]
    pub graph: GraphArgs,
}

impl SelfProfileArgs {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frequency_hz: self.frequency,
            max_samples: self.max_samples,
            ..SessionConfig::self_profiling()
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct RenderArgs {
    /// Folded stacks file (stdin if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// SVG output file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub graph: GraphArgs,
}

#[derive(ClapArgs, Debug)]
pub struct DiffArgs {
    /// Baseline folded stacks
    pub before: PathBuf,

    /// Folded stacks to compare against the baseline
    pub after: PathBuf,

    /// SVG output file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub graph: GraphArgs,
}
