//! # pyrograph - Sampling Profiler and Flame Graph Renderer
//!
//! pyrograph captures stack traces from a running program, turns the raw
//! addresses into function names, aggregates identical stacks and draws the
//! result as an interactive SVG flame graph.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │  Timer-driven self-sampling  │   │  External process sampling   │
//! │  SIGPROF + stack walk        │   │  perf_event ring buffer      │
//! └──────────────┬───────────────┘   └──────────────┬───────────────┘
//!                │ RawSample                        │ RawSample
//!                ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Sample Buffer (lock-free, fixed capacity)          │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │ after the source is disarmed
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Symbol Resolver: /proc/<pid>/maps + cache + OffsetResolver     │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐
//! │ Stack Folder │──▶│  Frame Tree  │──▶│ Layout + SVG (plain/diff)│
//! └──────────────┘   └──────────────┘   └──────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: capture side and session lifecycle
//!   - `sample_buffer`: signal-safe fixed-capacity sample storage
//!   - `timer_sampler`: `ITIMER_PROF`/`SIGPROF` self-sampling
//!   - `perf_ring` / `perf_source`: perf ring buffer draining on Linux
//!   - `session`: [`record_process`](profiling::record_process) and
//!     [`self_profile`](profiling::self_profile)
//!
//! - [`symbolization`]: address to function name
//!   - Uses DWARF debug information via the `addr2line` crate, or the
//!     external `addr2line` binary
//!   - Bounded open-addressing cache
//!
//! - [`aggregation`]: folded stacks and the weighted call tree
//!
//! - [`render`]: flame graph geometry, colors and SVG output
//!
//! - [`cli`], [`preflight`], [`process_lookup`]: the command-line surface
//!
//! - [`domain`]: core domain types ([`Pid`](domain::Pid)) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Sample a running process for 5 seconds
//! pyrograph record my-app --svg my-app.svg
//!
//! # Profile the built-in workload with the CPU timer
//! pyrograph self-profile --svg self.svg -o self.folded
//!
//! # Compare two profiles
//! pyrograph diff before.folded after.folded -o diff.svg
//! ```
//!
//! ## Key Concepts
//!
//! - **Folded stack**: `root;caller;leaf count`, one line per distinct stack
//! - **Inclusive / self count**: samples anywhere under a frame / with the
//!   frame as the leaf
//! - **PIE/ASLR**: addresses are translated to file offsets through the
//!   process's memory maps before lookup

pub mod aggregation;
pub mod cli;
pub mod domain;
pub mod preflight;
pub mod process_lookup;
pub mod profiling;
pub mod render;
pub mod symbolization;
