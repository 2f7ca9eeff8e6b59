//! Built-in CPU-bound workload with a known profile shape
//!
//! Three non-inlined kernels split CPU time roughly 70/20/10, so a correct
//! flame graph shows `compute_hot` about 3.5x wider than `compute_medium`
//! and 7x wider than `compute_cold`.

use std::hint::black_box;

/// Inner-loop lengths per round (hot, medium, cold)
const HOT_STEPS: u64 = 500_000;
const MEDIUM_STEPS: u64 = 143_000;
const COLD_STEPS: u64 = 71_500;

/// Default number of rounds for self-profiling
pub const DEFAULT_ITERATIONS: u32 = 200;

#[inline(never)]
pub fn compute_hot(steps: u64) -> f64 {
    let mut x = 1.0f64;
    for _ in 0..black_box(steps) {
        x = black_box(x * 1.000_000_1 + 0.000_000_1);
    }
    x
}

#[inline(never)]
pub fn compute_medium(steps: u64) -> f64 {
    let mut x = 2.0f64;
    for _ in 0..black_box(steps) {
        x = black_box(x * 0.999_999_9 + 0.000_000_2);
    }
    x
}

#[inline(never)]
pub fn compute_cold(steps: u64) -> f64 {
    let mut x = 3.0f64;
    for _ in 0..black_box(steps) {
        x = black_box(x * 1.000_000_2 - 0.000_000_1);
    }
    x
}

/// Run `iterations` rounds of the 70/20/10 mix
#[inline(never)]
pub fn run(iterations: u32) -> f64 {
    let mut sink = 0.0;
    for _ in 0..iterations {
        sink += compute_hot(HOT_STEPS);
        sink += compute_medium(MEDIUM_STEPS);
        sink += compute_cold(COLD_STEPS);
    }
    black_box(sink)
}
