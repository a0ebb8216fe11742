//! Thread-to-CPU pinning.
//!
//! Linux gets a real `sched_setaffinity` binding (the teacher crate already
//! depends on `libc`); other platforms treat pinning as advisory and log a
//! one-time warning per worker, matching spec §4.2's macOS note.

use std::sync::atomic::{AtomicBool, Ordering};

static AFFINITY_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);

/// Pin the calling thread to exactly one CPU. Contract: only called when
/// `affinity >= 0`; never called otherwise (OS-default placement).
pub fn set_thread_affinity(cpu_id: usize) {
    #[cfg(target_os = "linux")]
    {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(cpu_id, &mut set);
            let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
            if rc != 0 {
                log::warn!("failed to pin thread to cpu {cpu_id}");
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = cpu_id;
        if !AFFINITY_WARNING_LOGGED.swap(true, Ordering::Relaxed) {
            log::warn!("thread affinity is advisory on this platform and was not applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_to_cpu_zero_does_not_panic() {
        set_thread_affinity(0);
    }
}
