//! # External-Process Sampling Source (Linux perf events)
//!
//! Opens a software `CPU_CLOCK` sampling event on another process with
//! callchain collection and maps its ring buffer. Draining goes through
//! [`RingReader`], so this module only owns the kernel resources.
//!
//! ## Requirements
//! - `perf_event_paranoid <= 2` for profiling your own processes, or
//!   `CAP_PERFMON`/root for anything else
//! - The ring data area must be a power-of-two number of pages

#![allow(unsafe_code)]

use log::{debug, info, warn};
use std::ffi::{c_int, c_ulong};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, Ordering};
use std::time::Duration;

use super::perf_ring::{RingMemory, RingReader};
use crate::domain::{Pid, ProfilerError};

const PERF_TYPE_SOFTWARE: u32 = 1;
const PERF_COUNT_SW_CPU_CLOCK: u64 = 0;
const PERF_SAMPLE_CALLCHAIN: u64 = 1 << 5;
const PERF_FLAG_FD_CLOEXEC: c_ulong = 1 << 3;

const PERF_ATTR_FLAG_DISABLED: u64 = 1 << 0;
const PERF_ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
const PERF_ATTR_FLAG_EXCLUDE_HV: u64 = 1 << 6;
const PERF_ATTR_FLAG_FREQ: u64 = 1 << 10;

/// `PERF_ATTR_SIZE_VER3`
const PERF_ATTR_SIZE: u32 = 96;

const PERF_EVENT_IOC_ENABLE: c_ulong = 0x2400;
const PERF_EVENT_IOC_DISABLE: c_ulong = 0x2401;
const PERF_EVENT_IOC_RESET: c_ulong = 0x2403;

/// Samples accumulated before the kernel wakes a poller
const WAKEUP_EVENTS: u32 = 16;

/// `struct perf_event_attr` up to `PERF_ATTR_SIZE_VER3`
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct PerfEventAttr {
    kind: u32,
    size: u32,
    config: u64,
    sample_freq: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    bp_addr: u64,
    bp_len: u64,
    branch_sample_type: u64,
    sample_regs_user: u64,
    sample_stack_user: u32,
    clock_id: i32,
}

/// First page of the mapping (`struct perf_event_mmap_page`)
#[repr(C)]
#[allow(dead_code)]
struct PerfEventMmapPage {
    version: u32,
    compat_version: u32,
    lock: u32,
    index: u32,
    offset: i64,
    time_enabled: u64,
    time_running: u64,
    capabilities: u64,
    pmc_width: u16,
    time_shift: u16,
    time_mult: u32,
    time_offset: u64,
    time_zero: u64,
    size: u32,
    reserved: [u8; 118 * 8 + 4],
    data_head: u64,
    data_tail: u64,
    data_offset: u64,
    data_size: u64,
}

/// A sampling event attached to one process, with its ring buffer mapped
pub struct PerfEventSource {
    fd: OwnedFd,
    base: NonNull<u8>,
    map_len: usize,
    page_size: usize,
    data_size: u64,
}

impl PerfEventSource {
    /// Open a disabled sampling event on `pid`
    ///
    /// # Errors
    /// - [`ProfilerError::InvalidRingSize`] if `data_pages` is not a power of two
    /// - [`ProfilerError::PerfOpenFailed`] if the kernel refuses the event
    /// - [`ProfilerError::MmapFailed`] if the ring cannot be mapped
    pub fn open(pid: Pid, frequency_hz: u32, data_pages: usize) -> Result<Self, ProfilerError> {
        let page_size = page_size();
        let data_size = (data_pages * page_size) as u64;
        if data_pages == 0 || !data_pages.is_power_of_two() {
            return Err(ProfilerError::InvalidRingSize(data_size));
        }

        let attr = PerfEventAttr {
            kind: PERF_TYPE_SOFTWARE,
            size: PERF_ATTR_SIZE,
            config: PERF_COUNT_SW_CPU_CLOCK,
            sample_freq: u64::from(frequency_hz.max(1)),
            sample_type: PERF_SAMPLE_CALLCHAIN,
            flags: PERF_ATTR_FLAG_DISABLED
                | PERF_ATTR_FLAG_EXCLUDE_KERNEL
                | PERF_ATTR_FLAG_EXCLUDE_HV
                | PERF_ATTR_FLAG_FREQ,
            wakeup_events: WAKEUP_EVENTS,
            ..PerfEventAttr::default()
        };

        // SAFETY: attr is a valid VER3 perf_event_attr that outlives the call.
        let raw = unsafe {
            libc::syscall(
                libc::SYS_perf_event_open,
                ptr::from_ref(&attr),
                pid.0,
                -1 as c_int,
                -1 as c_int,
                PERF_FLAG_FD_CLOEXEC,
            )
        };
        if raw < 0 {
            let source = io::Error::last_os_error();
            if matches!(source.raw_os_error(), Some(libc::EACCES | libc::EPERM)) {
                warn!(
                    "perf_event_open denied; check /proc/sys/kernel/perf_event_paranoid or run with CAP_PERFMON"
                );
            }
            return Err(ProfilerError::PerfOpenFailed { pid, source });
        }
        #[allow(clippy::cast_possible_truncation)]
        // SAFETY: the syscall returned a fresh descriptor we now own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw as c_int) };

        let map_len = (1 + data_pages) * page_size;
        // SAFETY: mapping a perf fd shared read/write as the kernel expects.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(ProfilerError::MmapFailed(io::Error::last_os_error()));
        }
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| ProfilerError::MmapFailed(io::Error::other("mmap returned null")))?;

        info!(
            "Opened perf sampling on {pid} at {frequency_hz} Hz ({data_pages} data pages, {data_size} bytes)"
        );
        Ok(Self { fd, base, map_len, page_size, data_size })
    }

    /// Start sampling
    ///
    /// # Errors
    /// Returns the ioctl failure.
    pub fn enable(&self) -> Result<(), ProfilerError> {
        self.ioctl(PERF_EVENT_IOC_RESET)?;
        self.ioctl(PERF_EVENT_IOC_ENABLE)
    }

    /// Stop sampling; records already in the ring stay readable
    ///
    /// # Errors
    /// Returns the ioctl failure.
    pub fn disable(&self) -> Result<(), ProfilerError> {
        self.ioctl(PERF_EVENT_IOC_DISABLE)
    }

    /// Wait up to `timeout` for the kernel to signal readable records
    ///
    /// Returns `Ok(false)` on timeout or when interrupted by a signal.
    ///
    /// # Errors
    /// Returns the poll failure.
    pub fn poll(&self, timeout: Duration) -> Result<bool, ProfilerError> {
        let mut pfd = libc::pollfd { fd: self.fd.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        let millis = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
        // SAFETY: one valid pollfd.
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(ProfilerError::Io(err));
        }
        Ok(ready > 0)
    }

    /// Reader over the mapped ring
    ///
    /// # Errors
    /// [`ProfilerError::InvalidRingSize`] if the mapped data area is not a
    /// power of two.
    pub fn reader(&self) -> Result<RingReader<MmapRing<'_>>, ProfilerError> {
        RingReader::new(MmapRing { source: self })
    }

    fn ioctl(&self, request: c_ulong) -> Result<(), ProfilerError> {
        // SAFETY: argument-less perf ioctl on our own descriptor.
        let result = unsafe { libc::ioctl(self.fd.as_raw_fd(), request as _, 0) };
        if result == -1 {
            return Err(ProfilerError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn control_page(&self) -> *mut PerfEventMmapPage {
        self.base.as_ptr().cast::<PerfEventMmapPage>()
    }
}

impl Drop for PerfEventSource {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly the region mapped in `open`.
        let err = unsafe { libc::munmap(self.base.as_ptr().cast(), self.map_len) };
        if err != 0 {
            debug!("munmap of perf ring failed: {}", io::Error::last_os_error());
        }
    }
}

/// The data area of a mapped perf ring
pub struct MmapRing<'a> {
    source: &'a PerfEventSource,
}

impl RingMemory for MmapRing<'_> {
    fn data_size(&self) -> u64 {
        self.source.data_size
    }

    fn load_head(&self) -> u64 {
        let page = self.source.control_page();
        // SAFETY: the control page stays mapped while `source` is borrowed.
        let head = unsafe { ptr::read_volatile(ptr::addr_of!((*page).data_head)) };
        fence(Ordering::Acquire);
        head
    }

    fn load_tail(&self) -> u64 {
        let page = self.source.control_page();
        // SAFETY: as above; only we write data_tail.
        unsafe { ptr::read_volatile(ptr::addr_of!((*page).data_tail)) }
    }

    fn store_tail(&self, tail: u64) {
        let page = self.source.control_page();
        fence(Ordering::Release);
        // SAFETY: as above.
        unsafe { ptr::write_volatile(ptr::addr_of_mut!((*page).data_tail), tail) };
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_span(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset + dst.len() <= self.source.data_size as usize);
        // SAFETY: the data area starts one page after the base and the
        // caller keeps the span within it.
        unsafe {
            let src = self.source.base.as_ptr().add(self.source.page_size + offset);
            ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len());
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|s| *s > 0).unwrap_or(4096)
}
