//! # Timer-Driven Self-Sampling
//!
//! Arms `ITIMER_PROF` so the kernel delivers `SIGPROF` after every interval
//! of process CPU time. The handler walks the interrupted thread's stack and
//! appends one [`RawSample`] to the active [`SampleBuffer`].
//!
//! ## Signal-Context Rules
//!
//! The handler runs on the interrupted thread's stack while that thread's
//! normal code is suspended, so it must not take any lock that ordinary code
//! may hold and must not allocate. It only:
//! - loads the active buffer pointer (atomic)
//! - reads the interrupted program counter from the signal context
//! - walks the stack into a stack-local sample (`trace_unsynchronized`)
//! - claims a slot with one atomic increment and copies the sample in
//!
//! The walk starts inside the handler. Frames deeper than the interrupted
//! program counter (the handler, the unwinder and the kernel's signal
//! trampoline) are cut before the sample is stored, so the leaf of every
//! sample is the code that was running when the timer fired.
//!
//! ## Lifecycle
//!
//! The buffer pointer is process-wide state. [`TimerSampler::start`] installs
//! it (failing if another session is armed) and [`TimerSampler::stop`] (or
//! drop) disarms the timer, restores the previous `SIGPROF` disposition,
//! clears the pointer and waits for in-flight handlers before returning.

#![allow(unsafe_code)]

use log::{debug, info};
use pyrograph_common::{RawSample, MAX_STACK_DEPTH};
use std::ffi::{c_int, c_void};
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::sample_buffer::SampleBuffer;
use crate::domain::ProfilerError;

/// Default self-sampling frequency
///
/// Prime, so the sampling period does not line up with loop periods in the
/// profiled workload.
pub const DEFAULT_SELF_FREQUENCY_HZ: u32 = 997;

/// Buffer receiving samples from the signal handler (null when disarmed)
static ACTIVE_BUFFER: AtomicPtr<SampleBuffer> = AtomicPtr::new(ptr::null_mut());

/// Number of handler invocations currently executing
static HANDLERS_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// An armed self-sampling session
pub struct TimerSampler {
    buffer: Arc<SampleBuffer>,
    previous_action: libc::sigaction,
    armed: bool,
}

impl TimerSampler {
    /// Arm the profiling timer, capturing into `buffer`
    ///
    /// # Errors
    /// - [`ProfilerError::SessionActive`] if another sampler is armed
    /// - [`ProfilerError::TimerInstallFailed`] if `sigaction`/`setitimer` fail
    pub fn start(buffer: Arc<SampleBuffer>, frequency_hz: u32) -> Result<Self, ProfilerError> {
        let raw = Arc::as_ptr(&buffer).cast_mut();
        ACTIVE_BUFFER
            .compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ProfilerError::SessionActive)?;

        let previous_action = match install_handler() {
            Ok(previous) => previous,
            Err(e) => {
                ACTIVE_BUFFER.store(ptr::null_mut(), Ordering::SeqCst);
                return Err(ProfilerError::TimerInstallFailed(e));
            }
        };

        let mut sampler = Self { buffer, previous_action, armed: true };

        let interval = sampling_interval(frequency_hz);
        if let Err(e) = set_profiling_timer(interval) {
            sampler.disarm();
            return Err(ProfilerError::TimerInstallFailed(e));
        }

        info!("Self-sampling armed at {frequency_hz} Hz (every {}us)", interval.as_micros());
        Ok(sampler)
    }

    /// Disarm the timer and hand back the buffer for reading
    #[must_use]
    pub fn stop(mut self) -> Arc<SampleBuffer> {
        self.disarm();
        Arc::clone(&self.buffer)
    }

    fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        if let Err(e) = set_profiling_timer(Duration::ZERO) {
            debug!("Failed to clear profiling timer: {e}");
        }
        // SAFETY: restoring the disposition captured at install time.
        let err = unsafe { libc::sigaction(libc::SIGPROF, &self.previous_action, ptr::null_mut()) };
        if err != 0 {
            debug!("Failed to restore SIGPROF disposition: {}", io::Error::last_os_error());
        }

        ACTIVE_BUFFER.store(ptr::null_mut(), Ordering::SeqCst);
        // A handler that saw the old pointer may still be copying into it
        while HANDLERS_IN_FLIGHT.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }

        debug!(
            "Self-sampling disarmed: {} samples, {} dropped",
            self.buffer.len(),
            self.buffer.dropped()
        );
    }
}

impl Drop for TimerSampler {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Timer period for a sampling frequency
///
/// Clamped to 1 Hz .. 1 MHz: `setitimer` has microsecond resolution and a
/// zero period would disarm the timer.
#[must_use]
pub fn sampling_interval(frequency_hz: u32) -> Duration {
    let micros = 1_000_000 / u64::from(frequency_hz.max(1));
    Duration::from_micros(micros.max(1))
}

fn install_handler() -> io::Result<libc::sigaction> {
    // SAFETY: zeroed sigaction is a valid "empty" value; the handler has the
    // SA_SIGINFO signature.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) = on_sigprof;
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(libc::SIGPROF, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(previous)
    }
}

fn set_profiling_timer(interval: Duration) -> io::Result<()> {
    let period = libc::timeval {
        tv_sec: libc::time_t::try_from(interval.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_usec: libc::suseconds_t::from(interval.subsec_micros()),
    };
    let timer = libc::itimerval { it_interval: period, it_value: period };

    // SAFETY: plain syscall with a valid itimerval.
    let err = unsafe { libc::setitimer(libc::ITIMER_PROF, &timer, ptr::null_mut()) };
    if err != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `SIGPROF` handler: capture the current thread's stack
///
/// Uses only atomics, a stack walk, and a copy into a pre-allocated slot.
extern "C" fn on_sigprof(_sig: c_int, _info: *mut libc::siginfo_t, context: *mut c_void) {
    HANDLERS_IN_FLIGHT.fetch_add(1, Ordering::SeqCst);

    let buffer = ACTIVE_BUFFER.load(Ordering::SeqCst);
    if !buffer.is_null() {
        // SAFETY: `disarm` clears the pointer and then waits for
        // HANDLERS_IN_FLIGHT to reach zero before the buffer can be freed.
        let buffer = unsafe { &*buffer };
        let interrupted = interrupted_pc(context);
        buffer.capture_with(|sample| walk_current_stack(sample, interrupted));
    }

    HANDLERS_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
}

/// Program counter of the code the signal interrupted
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
#[allow(clippy::cast_sign_loss)]
fn interrupted_pc(context: *mut c_void) -> Option<u64> {
    if context.is_null() {
        return None;
    }
    // SAFETY: SA_SIGINFO handlers receive a valid ucontext_t.
    let ucontext = unsafe { &*context.cast::<libc::ucontext_t>() };
    Some(ucontext.uc_mcontext.gregs[libc::REG_RIP as usize] as u64)
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn interrupted_pc(context: *mut c_void) -> Option<u64> {
    if context.is_null() {
        return None;
    }
    // SAFETY: SA_SIGINFO handlers receive a valid ucontext_t.
    let ucontext = unsafe { &*context.cast::<libc::ucontext_t>() };
    Some(ucontext.uc_mcontext.pc)
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64"))))]
fn interrupted_pc(_context: *mut c_void) -> Option<u64> {
    None
}

/// Walk the calling thread's stack, deepest frame first
///
/// With `interrupted_pc`, the sample starts at the first frame whose
/// instruction pointer equals it. If no frame matches, the whole walk is
/// kept and the folder's frame filter removes the handler frames.
fn walk_current_stack(sample: &mut RawSample, interrupted_pc: Option<u64>) {
    let mut depth = 0usize;
    let mut truncated = false;
    let mut interrupted_at = None;

    // SAFETY: unsynchronized tracing avoids the backtrace crate's global
    // lock, which the interrupted thread may be holding.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if depth == MAX_STACK_DEPTH {
                truncated = true;
                return false;
            }
            let ip = frame.ip() as u64;
            if interrupted_at.is_none() && interrupted_pc == Some(ip) {
                interrupted_at = Some(depth);
            }
            sample.ips[depth] = ip;
            depth += 1;
            true
        });
    }

    if let Some(start) = interrupted_at {
        sample.ips.copy_within(start..depth, 0);
        depth -= start;
    }

    #[allow(clippy::cast_possible_truncation)]
    {
        sample.depth = depth as u32;
    }
    sample.truncated = u8::from(truncated);
}
