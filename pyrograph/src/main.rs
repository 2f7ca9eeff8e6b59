//! # pyrograph - Main Entry Point
//!
//! Four subcommands:
//! - **record** (`pyrograph record <PROCESS>` or `--pid <PID>`): perf-event
//!   sampling of another process
//! - **self-profile**: timer-driven sampling of the built-in workload
//! - **render**: folded stacks to SVG
//! - **diff**: two folded profiles to a differential SVG
//!
//! Folded stacks and SVG go to files or stdout; progress and summaries go to
//! stderr.

#![allow(clippy::needless_pass_by_value, clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pyrograph::aggregation::{FoldedStacks, FrameTree, TreeConfig};
use pyrograph::cli::{Args, Command, DiffArgs, GraphArgs, RecordArgs, RenderArgs, ResolverKind, SelfProfileArgs};
use pyrograph::domain::{Pid, ProfilerError, RenderError};
use pyrograph::preflight::run_preflight_checks;
use pyrograph::process_lookup::Target;
use pyrograph::profiling::{record_process, self_profile, workload, SessionOutput};
use pyrograph::render::{render_diff, render_flamegraph, DiffTree};
use pyrograph::symbolization::{Addr2LineCommand, DwarfResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NO_SAMPLES: i32 = 3;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if matches!(err.downcast_ref::<RenderError>(), Some(RenderError::NoSamples)) {
        return EXIT_NO_SAMPLES;
    }
    if let Some(ProfilerError::PerfOpenFailed { source, .. }) = err.downcast_ref::<ProfilerError>() {
        if matches!(source.raw_os_error(), Some(libc::EACCES | libc::EPERM)) {
            return EXIT_NOPERM;
        }
    }

    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Record(record) => run_record(record).await,
        Command::SelfProfile(own) => run_self_profile(own),
        Command::Render(render) => run_render(render),
        Command::Diff(diff) => run_diff(diff),
    }
}

/// Resolve the target from a process name or `--pid`.
fn resolve_target(args: &RecordArgs) -> Result<Target> {
    if let Some(ref name) = args.process {
        return Target::find(name);
    }
    if let Some(pid) = args.pid {
        return Ok(Target::from_pid(Pid(pid))?);
    }

    anyhow::bail!(
        "Missing required argument: PROCESS or --pid\n\n\
         Usage:\n  \
         pyrograph record my-app        Find the PID by name\n  \
         pyrograph record --pid 1234    Explicit PID\n\n\
         Run 'pyrograph record --help' for more options"
    )
}

async fn run_record(args: RecordArgs) -> Result<()> {
    let Target { pid, exe: exe_path } = resolve_target(&args)?;
    run_preflight_checks(pid, &exe_path)?;

    let config = args.session_config();
    eprintln!("pyrograph v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("target: {}", exe_path.display());
    eprintln!("pid: {}", pid.0);
    eprintln!("sampling: {} Hz for {}s (Ctrl+C to stop early)", config.frequency_hz, config.duration.as_secs());

    let stop = Arc::new(AtomicBool::new(false));
    let session_stop = Arc::clone(&stop);
    let resolver = args.resolver;

    // Resolvers are built on the blocking thread; the DWARF one is not Send
    let mut session = tokio::task::spawn_blocking(move || match resolver {
        ResolverKind::Dwarf => record_process(pid, &config, DwarfResolver::new(), &session_stop),
        ResolverKind::Addr2line => record_process(pid, &config, Addr2LineCommand::new(), &session_stop),
    });

    let joined = tokio::select! {
        result = &mut session => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted, finishing...");
            stop.store(true, Ordering::Relaxed);
            session.await
        }
    };
    let output = joined.context("Recording task failed")??;

    write_outputs(&output, args.output.as_deref(), args.svg.as_deref(), args.summary.as_deref(), &args.graph)
}

fn run_self_profile(args: SelfProfileArgs) -> Result<()> {
    let config = args.session_config();
    let iterations = args.iterations;
    eprintln!("self-profiling {iterations} workload iterations at {} Hz", config.frequency_hz);

    let output = self_profile(&config, DwarfResolver::new(), || {
        std::hint::black_box(workload::run(iterations));
    })?;

    write_outputs(&output, args.output.as_deref(), args.svg.as_deref(), args.summary.as_deref(), &args.graph)
}

fn run_render(args: RenderArgs) -> Result<()> {
    let folded = match args.input {
        Some(ref path) => read_folded(path)?,
        None => FoldedStacks::parse(io::stdin().lock()).context("Failed to read folded stacks from stdin")?,
    };
    if folded.skipped_lines() > 0 {
        warn!("Skipped {} malformed folded lines", folded.skipped_lines());
    }

    let tree = FrameTree::from_folded(&folded, TreeConfig::default());
    let options = args.graph.svg_options();
    let mut out = open_output(args.output.as_deref())?;
    render_flamegraph(&tree, &options, &mut out)?;

    eprintln!("{} samples, {} stacks, {} frames", tree.total_samples(), folded.len(), tree.len());
    Ok(())
}

fn run_diff(args: DiffArgs) -> Result<()> {
    let before = read_folded(&args.before)?;
    let after = read_folded(&args.after)?;

    let tree = DiffTree::from_profiles(&before, &after, TreeConfig::default());
    let options = args.graph.svg_options();
    let mut out = open_output(args.output.as_deref())?;
    render_diff(&tree, &options, &mut out)?;

    eprintln!("before: {} samples, after: {} samples", tree.before_total(), tree.after_total());
    Ok(())
}

fn read_folded(path: &Path) -> Result<FoldedStacks> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let folded = FoldedStacks::parse(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    info!("{}: {} stacks, {} samples", path.display(), folded.len(), folded.total_samples());
    Ok(folded)
}

/// Buffered writer to `path`, or stdout
fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// Folded text, SVG and JSON summary for a finished session
fn write_outputs(
    output: &SessionOutput,
    folded_path: Option<&Path>,
    svg_path: Option<&Path>,
    summary_path: Option<&Path>,
    graph: &GraphArgs,
) -> Result<()> {
    let summary = &output.summary;
    eprintln!(
        "\n{:.1}s: {} samples captured ({} dropped, {} truncated), {} stacks, {} discarded",
        summary.elapsed_ms as f64 / 1000.0,
        summary.captured,
        summary.dropped,
        summary.truncated,
        summary.distinct_stacks,
        summary.discarded_samples,
    );
    eprintln!(
        "symbols: {} lookups, {} cache hits, {} resolver calls, {} unresolved",
        summary.resolver.lookups, summary.resolver.cache_hits, summary.resolver.external_calls, summary.resolver.unresolved,
    );

    if folded_path.is_some() || svg_path.is_none() {
        let out = open_output(folded_path)?;
        output.folded.write_to(out).context("Failed to write folded stacks")?;
        if let Some(path) = folded_path {
            eprintln!("saved: {}", path.display());
        }
    }

    if let Some(path) = svg_path {
        let tree = FrameTree::from_folded(&output.folded, TreeConfig::default());
        let out = open_output(Some(path))?;
        render_flamegraph(&tree, &graph.svg_options(), out)?;
        eprintln!("saved: {}", path.display());
    }

    if let Some(path) = summary_path {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, summary).context("Failed to write summary")?;
        writer.flush().context("Failed to write summary")?;
        eprintln!("saved: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_samples_exit_code() {
        let err = anyhow::Error::new(RenderError::NoSamples).context("rendering");
        assert_eq!(exit_code_for(&err), EXIT_NO_SAMPLES);
    }

    #[test]
    fn test_perf_denied_exit_code() {
        let err = anyhow::Error::new(ProfilerError::PerfOpenFailed {
            pid: Pid(1),
            source: io::Error::from_raw_os_error(libc::EACCES),
        });
        assert_eq!(exit_code_for(&err), EXIT_NOPERM);
    }

    #[test]
    fn test_usage_exit_code() {
        let err = anyhow::anyhow!("Missing required argument: PROCESS or --pid");
        assert_eq!(exit_code_for(&err), EXIT_USAGE);
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_ERROR);
    }

    #[test]
    fn test_missing_pid_reports_process_not_found() {
        let Command::Record(record) = Args::parse_from(["pyrograph", "record", "--pid", "999999999"]).command else {
            panic!("expected record");
        };
        let err = resolve_target(&record).expect_err("no such process");
        assert!(matches!(err.downcast_ref::<ProfilerError>(), Some(ProfilerError::ProcessNotFound(_))));
        assert_eq!(exit_code_for(&err), EXIT_ERROR);
    }

    #[test]
    fn test_missing_input_file() {
        let result = read_folded(Path::new("/nonexistent/profile.folded"));
        assert!(result.is_err());
    }
}
