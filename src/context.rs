//! Per-lane scratchpad allocation.
//!
//! Mirrors the teacher's huge-page probing in `miner.rs::new_full` (alloc a
//! test cache with `FLAG_LARGE_PAGES`, fall back on failure) but generalized
//! to the spec's four memory modes and exposed as an explicit allocator the
//! pool drives at worker start-up, rather than module-global state.

use std::sync::atomic::{AtomicBool, Ordering};

const SLOW_MEM_SIZE: usize = 2 * 1024 * 1024; // 2 MiB CryptoNight scratchpad
const FAST_MEM_SIZE: usize = 200 * 1024; // 200 KiB fast region

/// Scratchpad allocation policy, configured per pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryMode {
    /// Huge pages + mlock mandatory; fail (null) if unavailable.
    NeverUseLarge,
    /// Huge pages required, mlock not attempted; fail if unavailable.
    NoMlock,
    /// Try huge pages + mlock; log and fall back to regular pages on
    /// failure rather than fail outright.
    PrintWarning,
    /// Regular (small) pages only, no mlock.
    AlwaysUseLarge,
}

/// One lane's scratchpad pair: a 2 MiB "slow" region plus a 200 KiB "fast"
/// region, both large-page-backed when the mode allows it.
pub struct HashContext {
    slow: *mut libc::c_void,
    fast: *mut libc::c_void,
    using_large_pages: bool,
}

// Safety: contexts are allocated on the worker thread that will exclusively
// use them; they are Send so a worker can build them after pinning, but are
// never shared across threads concurrently.
unsafe impl Send for HashContext {}

impl HashContext {
    pub fn slow_ptr(&self) -> *mut libc::c_void {
        self.slow
    }

    pub fn fast_ptr(&self) -> *mut libc::c_void {
        self.fast
    }

    pub fn using_large_pages(&self) -> bool {
        self.using_large_pages
    }
}

impl Drop for HashContext {
    fn drop(&mut self) {
        unsafe {
            if !self.slow.is_null() {
                libc::munmap(self.slow, SLOW_MEM_SIZE);
            }
            if !self.fast.is_null() {
                libc::munmap(self.fast, FAST_MEM_SIZE);
            }
        }
    }
}

static HUGE_PAGE_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);

fn mmap_region(size: usize, large_pages: bool) -> *mut libc::c_void {
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    if large_pages {
        flags |= libc::MAP_HUGETLB;
    }
    unsafe {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        );
        if ptr == libc::MAP_FAILED {
            std::ptr::null_mut()
        } else {
            ptr
        }
    }
}

fn try_mlock(ptr: *mut libc::c_void, size: usize) -> bool {
    unsafe { libc::mlock(ptr, size) == 0 }
}

fn free_region(ptr: *mut libc::c_void, size: usize) {
    if !ptr.is_null() {
        unsafe {
            libc::munmap(ptr, size);
        }
    }
}

/// One-time platform readiness check. Returns `false` on fatal failure in
/// strict modes (mirrors spec §4.1 `init`).
pub fn init(mode: MemoryMode) -> bool {
    match mode {
        MemoryMode::NeverUseLarge | MemoryMode::NoMlock => {
            let probe = mmap_region(SLOW_MEM_SIZE, true);
            if probe.is_null() {
                log::error!("huge pages unavailable but required by the configured memory mode");
                return false;
            }
            free_region(probe, SLOW_MEM_SIZE);
            true
        }
        MemoryMode::PrintWarning | MemoryMode::AlwaysUseLarge => true,
    }
}

/// Allocate one scratchpad pair per spec §4.1's mode semantics.
pub fn allocate(mode: MemoryMode) -> Option<HashContext> {
    match mode {
        MemoryMode::NeverUseLarge => {
            let slow = mmap_region(SLOW_MEM_SIZE, true);
            let fast = mmap_region(FAST_MEM_SIZE, true);
            if slow.is_null() || fast.is_null() {
                free_region(slow, SLOW_MEM_SIZE);
                free_region(fast, FAST_MEM_SIZE);
                return None;
            }
            if !try_mlock(slow, SLOW_MEM_SIZE) || !try_mlock(fast, FAST_MEM_SIZE) {
                free_region(slow, SLOW_MEM_SIZE);
                free_region(fast, FAST_MEM_SIZE);
                return None;
            }
            Some(HashContext {
                slow,
                fast,
                using_large_pages: true,
            })
        }
        MemoryMode::NoMlock => {
            let slow = mmap_region(SLOW_MEM_SIZE, true);
            let fast = mmap_region(FAST_MEM_SIZE, true);
            if slow.is_null() || fast.is_null() {
                free_region(slow, SLOW_MEM_SIZE);
                free_region(fast, FAST_MEM_SIZE);
                return None;
            }
            Some(HashContext {
                slow,
                fast,
                using_large_pages: true,
            })
        }
        MemoryMode::PrintWarning => {
            let slow = mmap_region(SLOW_MEM_SIZE, true);
            let fast = mmap_region(FAST_MEM_SIZE, true);
            if !slow.is_null() && !fast.is_null() && try_mlock(slow, SLOW_MEM_SIZE) && try_mlock(fast, FAST_MEM_SIZE)
            {
                return Some(HashContext {
                    slow,
                    fast,
                    using_large_pages: true,
                });
            }
            free_region(slow, SLOW_MEM_SIZE);
            free_region(fast, FAST_MEM_SIZE);
            if !HUGE_PAGE_WARNING_LOGGED.swap(true, Ordering::Relaxed) {
                log::warn!("large pages unavailable, falling back to regular pages");
            }
            let slow = mmap_region(SLOW_MEM_SIZE, false);
            let fast = mmap_region(FAST_MEM_SIZE, false);
            if slow.is_null() || fast.is_null() {
                free_region(slow, SLOW_MEM_SIZE);
                free_region(fast, FAST_MEM_SIZE);
                return None; // OOM even on regular pages
            }
            Some(HashContext {
                slow,
                fast,
                using_large_pages: false,
            })
        }
        MemoryMode::AlwaysUseLarge => {
            // Despite the name (carried from the source's naming, see
            // DESIGN.md), this mode means "regular pages only, no mlock".
            let slow = mmap_region(SLOW_MEM_SIZE, false);
            let fast = mmap_region(FAST_MEM_SIZE, false);
            if slow.is_null() || fast.is_null() {
                free_region(slow, SLOW_MEM_SIZE);
                free_region(fast, FAST_MEM_SIZE);
                return None;
            }
            Some(HashContext {
                slow,
                fast,
                using_large_pages: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_use_large_mode_allocates_regular_pages() {
        let ctx = allocate(MemoryMode::AlwaysUseLarge).expect("allocation should succeed");
        assert!(!ctx.using_large_pages());
        assert!(!ctx.slow_ptr().is_null());
        assert!(!ctx.fast_ptr().is_null());
    }

    #[test]
    fn print_warning_mode_never_returns_none_unless_oom() {
        // On any sane CI box regular-page fallback succeeds.
        let ctx = allocate(MemoryMode::PrintWarning);
        assert!(ctx.is_some());
    }
}
