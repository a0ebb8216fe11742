//! NUMA-local memory placement.
//!
//! Reads `/sys/devices/system/node/*/cpulist` to map a CPU id to its owning
//! NUMA node (same source of truth as
//! `other_examples/.../numa_optimizer.rs`), then sets the calling thread's
//! default allocation policy to that node via `libc::set_mempolicy`. Must
//! run before any scratchpad allocation so pages land on the right node.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

const MPOL_PREFERRED: libc::c_int = 1;

static NUMA_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);

/// Find which NUMA node owns `cpu_id`, or `None` if topology can't be read
/// (non-NUMA machine, non-Linux platform, or missing sysfs).
fn node_for_cpu(cpu_id: usize) -> Option<usize> {
    let entries = fs::read_dir("/sys/devices/system/node").ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(node_id_str) = name.strip_prefix("node") else {
            continue;
        };
        let Ok(node_id) = node_id_str.parse::<usize>() else {
            continue;
        };
        let cpulist_path = entry.path().join("cpulist");
        let Ok(cpulist) = fs::read_to_string(&cpulist_path) else {
            continue;
        };
        if cpulist_contains(cpulist.trim(), cpu_id) {
            return Some(node_id);
        }
    }
    None
}

/// Parse a sysfs cpulist like "0-3,8-11" and test membership.
fn cpulist_contains(cpulist: &str, cpu_id: usize) -> bool {
    for range in cpulist.split(',') {
        let range = range.trim();
        if range.is_empty() {
            continue;
        }
        if let Some((start, end)) = range.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                if (start..=end).contains(&cpu_id) {
                    return true;
                }
            }
        } else if let Ok(single) = range.parse::<usize>() {
            if single == cpu_id {
                return true;
            }
        }
    }
    false
}

/// Bind the calling thread's future allocations to the NUMA node owning
/// `cpu_id`. Must be called before any scratchpad allocation on this thread.
pub fn bind_memory_to_numa(cpu_id: usize) {
    let Some(node) = node_for_cpu(cpu_id) else {
        if !NUMA_WARNING_LOGGED.swap(true, Ordering::Relaxed) {
            log::warn!("could not determine NUMA topology; skipping memory binding");
        }
        return;
    };

    #[cfg(target_os = "linux")]
    unsafe {
        let mut mask: libc::c_ulong = 0;
        if node < (std::mem::size_of::<libc::c_ulong>() * 8) {
            mask |= 1 << node;
        }
        let max_node = node + 1;
        let rc = libc::syscall(
            libc::SYS_set_mempolicy,
            MPOL_PREFERRED,
            &mask as *const libc::c_ulong,
            max_node + 1,
        );
        if rc != 0 {
            log::warn!("set_mempolicy failed for numa node {node}");
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = node;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpulist_parses_ranges_and_singletons() {
        assert!(cpulist_contains("0-3,8-11", 2));
        assert!(cpulist_contains("0-3,8-11", 9));
        assert!(!cpulist_contains("0-3,8-11", 5));
        assert!(cpulist_contains("7", 7));
        assert!(!cpulist_contains("7", 8));
    }

    #[test]
    fn binding_unknown_cpu_does_not_panic() {
        bind_memory_to_numa(0);
    }
}
