//! CPU-bound demo target for external profiling
//!
//! Runs the built-in 70/20/10 workload in a loop and prints its PID, so it
//! can be sampled from another terminal.
//!
//! Run with: cargo run --release --example spin -- [SECONDS]
//! Then:     pyrograph record spin --svg spin.svg

use std::time::{Duration, Instant};

use pyrograph::profiling::workload;

fn main() {
    let seconds = std::env::args().nth(1).and_then(|arg| arg.parse().ok()).unwrap_or(30);
    let deadline = Instant::now() + Duration::from_secs(seconds);

    println!("spin: pid {} running for {seconds}s", std::process::id());

    let mut rounds = 0u64;
    let mut sink = 0.0;
    while Instant::now() < deadline {
        sink += workload::run(1);
        rounds += 1;
    }

    println!("spin: {rounds} rounds (checksum {sink:.3})");
}
