//! The per-worker hot loop (spec §4.5).
//!
//! One OS thread per worker. Pre-loop pins the thread and allocates its
//! lane contexts; the main loop hashes consecutive nonces width-at-a-time
//! until the job generation changes, then resumes against the new job.
//! Unified across widths 1/2/4/5/6 (one implementation, the kernel's width
//! selects how many lanes run per invocation) per spec DESIGN NOTES
//! "multiway code duplication".

use crate::context::{self, HashContext, MemoryMode};
use crate::kernel::MultiwayKernel;
use crate::telemetry::TelemetryRing;
use crate::work::{GlobalWorkSlot, Solution, WorkItem, NONCE_OFFSET};
use crate::{affinity, numa};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Static configuration for one worker, fixed for the pool's lifetime.
pub struct WorkerConfig {
    pub thread_no: usize,
    pub affinity: i32,
    pub resume_nonce: u32,
    pub mem_mode: MemoryMode,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Advance a nonce by one, respecting the nicehash top-byte reservation.
fn advance_nonce(nonce: u32, nicehash: bool) -> u32 {
    if nicehash {
        let top = nonce & 0xFF00_0000;
        let low = (nonce & 0x00FF_FFFF).wrapping_add(1) & 0x00FF_FFFF;
        top | low
    } else {
        nonce.wrapping_add(1)
    }
}

/// Spawn one worker thread. `make_kernel` is called on the worker thread
/// itself, after pinning/NUMA binding, so a kernel that allocates its own
/// state (e.g. a JIT buffer) does so on the correct node.
pub fn spawn<F>(
    cfg: WorkerConfig,
    make_kernel: F,
    slot: Arc<GlobalWorkSlot>,
    telemetry: Arc<TelemetryRing>,
    solutions: mpsc::Sender<Solution>,
    quit: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()>
where
    F: FnOnce() -> Box<dyn MultiwayKernel> + Send + 'static,
{
    std::thread::spawn(move || {
        if cfg.affinity >= 0 {
            numa::bind_memory_to_numa(cfg.affinity as usize);
            affinity::set_thread_affinity(cfg.affinity as usize);
        }

        let mut kernel = make_kernel();
        let width = kernel.width();

        let mut ctx: Vec<HashContext> = Vec::with_capacity(width);
        for _ in 0..width {
            match context::allocate(cfg.mem_mode) {
                Some(c) => ctx.push(c),
                None => {
                    log::error!("worker {} failed to allocate hash context, exiting", cfg.thread_no);
                    return;
                }
            }
        }

        run_hot_loop(&cfg, &mut *kernel, &mut ctx, &slot, &telemetry, &solutions, &quit);
    })
}

/// Per-lane working set: one concatenated blob buffer plus the nonces
/// currently written into each lane.
struct Lanes {
    width: usize,
    work_size: usize,
    blobs: Vec<u8>,
    hash_out: Vec<u8>,
    lane_nonces: Vec<u32>,
}

impl Lanes {
    fn new(width: usize) -> Self {
        Self {
            width,
            work_size: 0,
            blobs: Vec::new(),
            hash_out: vec![0u8; width * 32],
            lane_nonces: vec![0u32; width],
        }
    }

    /// Rebuild the blob buffer from a freshly consumed work item. For
    /// width 1 this is a no-op: the single lane hashes directly out of
    /// `local_work.work_blob`, which is a fixed-size member and therefore
    /// never needs "refreshing" the way the interleaved multiway buffer
    /// does (spec DESIGN NOTES: preserve this distinction).
    fn refresh(&mut self, local_work: &WorkItem) {
        if self.width == 1 {
            return;
        }
        self.work_size = local_work.work_size;
        self.blobs = vec![0u8; self.width * self.work_size];
        for lane in 0..self.width {
            let start = lane * self.work_size;
            self.blobs[start..start + self.work_size]
                .copy_from_slice(&local_work.work_blob[..self.work_size]);
        }
    }

    fn write_nonce(&mut self, local_work: &mut WorkItem, lane: usize, nonce: u32) {
        self.lane_nonces[lane] = nonce;
        if self.width == 1 {
            local_work.write_nonce(nonce);
        } else {
            let start = lane * self.work_size;
            self.blobs[start + NONCE_OFFSET..start + NONCE_OFFSET + 4]
                .copy_from_slice(&nonce.to_le_bytes());
        }
    }

    fn digest(&self, lane: usize) -> &[u8] {
        &self.hash_out[lane * 32..lane * 32 + 32]
    }
}

#[allow(clippy::too_many_arguments)]
fn run_hot_loop(
    cfg: &WorkerConfig,
    kernel: &mut dyn MultiwayKernel,
    ctx: &mut [HashContext],
    slot: &GlobalWorkSlot,
    telemetry: &TelemetryRing,
    solutions: &mpsc::Sender<Solution>,
    quit: &AtomicBool,
) {
    let width = kernel.width();
    let sample_mask: u64 = if width == 1 { 0xF } else { 0x3 };

    let (mut local_work, mut local_job_no) = slot.consume();
    local_work.resume_nonce = cfg.resume_nonce;
    let mut lanes = Lanes::new(width);
    lanes.work_size = local_work.work_size;
    lanes.refresh(&local_work);

    let mut count: u64 = 0;

    loop {
        if quit.load(Ordering::Relaxed) {
            return;
        }

        if local_work.stall {
            loop {
                if quit.load(Ordering::Relaxed) {
                    return;
                }
                if slot.job_no() > local_job_no {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            let (w, j) = slot.consume();
            local_work = w;
            local_work.resume_nonce = cfg.resume_nonce;
            local_job_no = j;
            lanes.refresh(&local_work);
            continue;
        }

        let initial_nonce = if local_work.nicehash {
            (local_work.read_nonce() & 0xFF00_0000) | (local_work.resume_nonce & 0x00FF_FFFF)
        } else {
            local_work.resume_nonce
        };
        let mut base_nonce = initial_nonce;

        while slot.job_no() == local_job_no {
            if count & sample_mask == 0 {
                telemetry.push(cfg.thread_no, count, now_ms());
            }
            count += width as u64;

            for lane in 0..width {
                base_nonce = advance_nonce(base_nonce, local_work.nicehash);
                lanes.write_nonce(&mut local_work, lane, base_nonce);
            }

            {
                let work_size = local_work.work_size;
                if width == 1 {
                    let blob = &local_work.work_blob[..work_size];
                    kernel.hash(blob, work_size, &mut lanes.hash_out, ctx);
                } else {
                    kernel.hash(&lanes.blobs, work_size, &mut lanes.hash_out, ctx);
                }
            }

            for lane in 0..width {
                let trailing = u64::from_le_bytes(lanes.digest(lane)[24..32].try_into().unwrap());
                if trailing < local_work.target {
                    let mut digest = [0u8; 32];
                    digest.copy_from_slice(lanes.digest(lane));
                    let _ = solutions.send(Solution {
                        job_id: local_work.job_id,
                        nonce: lanes.lane_nonces[lane],
                        digest,
                        pool_id: local_work.pool_id,
                    });
                }
            }

            std::thread::yield_now();
        }

        let (w, j) = slot.consume();
        local_work = w;
        local_work.resume_nonce = cfg.resume_nonce;
        local_job_no = j;
        lanes.refresh(&local_work);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nicehash_advance_preserves_top_byte() {
        let mut nonce = 0xAB00_0000u32;
        for _ in 0..300 {
            nonce = advance_nonce(nonce, true);
            assert_eq!(nonce & 0xFF00_0000, 0xAB00_0000);
        }
    }

    #[test]
    fn nicehash_advance_wraps_low_bits_without_touching_top_byte() {
        let mut nonce = 0xAB00_FFFE;
        nonce = advance_nonce(nonce, true);
        assert_eq!(nonce, 0xAB00_FFFF);
        nonce = advance_nonce(nonce, true);
        assert_eq!(nonce, 0xAB00_0000);
    }

    #[test]
    fn non_nicehash_advance_wraps_whole_word() {
        let nonce = advance_nonce(u32::MAX, false);
        assert_eq!(nonce, 0);
    }
}
