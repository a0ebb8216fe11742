//! The worker pool: owns the shared work slot, spawns one thread per
//! configured worker, and serializes job switches against them (spec §4.6).

use crate::config::PoolConfig;
use crate::context::MemoryMode;
use crate::kernel::MultiwayKernel;
use crate::telemetry::TelemetryRing;
use crate::work::{GlobalWorkSlot, Solution, WorkItem};
use crate::worker::{self, WorkerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// How long `switch_work` waits between polls of `consume_count` before
/// giving up and logging a stuck-worker warning (spec §4.6).
const SWITCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running set of mining worker threads sharing one job stream.
pub struct WorkerPool {
    slot: Arc<GlobalWorkSlot>,
    telemetry: Arc<TelemetryRing>,
    quit: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
    solutions: mpsc::Receiver<Solution>,
    thread_count: usize,
}

impl WorkerPool {
    /// Start every configured worker. `make_kernel` is called once per
    /// worker, on that worker's own thread, and must return a kernel whose
    /// `width()` matches the `Multiway` requested for that thread.
    pub fn start<F>(config: &PoolConfig, mem_mode: MemoryMode, make_kernel: F) -> Self
    where
        F: Fn(usize) -> Box<dyn MultiwayKernel> + Send + Sync + 'static,
    {
        let thread_count = config.threads.len();
        let slot = Arc::new(GlobalWorkSlot::new(thread_count, WorkItem::stalled()));
        let telemetry = Arc::new(TelemetryRing::new(thread_count));
        let quit = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let make_kernel = Arc::new(make_kernel);
        let mut handles = Vec::with_capacity(thread_count);

        // Fixed, non-overlapping nonce partitioning: thread i starts at
        // (2^32 / thread_count) * i, so two workers never try the same
        // nonce before either exhausts its own range (spec §4.6).
        let span = (u32::MAX as u64 + 1) / thread_count as u64;

        for (i, thread_cfg) in config.threads.iter().enumerate() {
            let worker_cfg = WorkerConfig {
                thread_no: i,
                affinity: thread_cfg.cpu_aff,
                resume_nonce: (span * i as u64) as u32,
                mem_mode,
            };
            let make_kernel = Arc::clone(&make_kernel);
            let width = thread_cfg.multiway.width();
            let handle = worker::spawn(
                worker_cfg,
                move || make_kernel(width),
                Arc::clone(&slot),
                Arc::clone(&telemetry),
                tx.clone(),
                Arc::clone(&quit),
            );
            handles.push(handle);
        }
        drop(tx);

        Self {
            slot,
            telemetry,
            quit,
            handles,
            solutions: rx,
            thread_count,
        }
    }

    /// Wait for every worker to consume the current generation, then publish
    /// the next job. Spin-polls `consume_count` first so `current_work` is
    /// never overwritten while a worker might still be reading the prior
    /// generation (spec §4.6); returns early if every worker thread has
    /// already exited.
    pub fn switch_work(&self, item: WorkItem) {
        loop {
            if self.slot.consume_count() >= self.thread_count {
                break;
            }
            if self.handles.iter().all(|h| h.is_finished()) {
                break;
            }
            std::thread::sleep(SWITCH_POLL_INTERVAL);
        }
        self.slot.publish(item);
    }

    /// Tell every worker there is no work; they spin-wait until the next
    /// `switch_work`.
    pub fn stall(&self) {
        self.switch_work(WorkItem::stalled());
    }

    /// Windowed hashrate for one worker, in hashes/sec, or `NaN` if there
    /// isn't enough history yet.
    pub fn hashrate(&self, thread_no: usize, window_ms: u64) -> f64 {
        self.telemetry.hashrate(thread_no, window_ms)
    }

    /// Sum of all workers' instantaneous hashrate, ignoring any worker
    /// that doesn't have enough history yet.
    pub fn total_hashrate(&self, window_ms: u64) -> f64 {
        (0..self.thread_count)
            .map(|t| self.hashrate(t, window_ms))
            .filter(|r| !r.is_nan())
            .sum()
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Drain any solutions found since the last call, without blocking.
    pub fn try_recv_solutions(&self) -> Vec<Solution> {
        self.solutions.try_iter().collect()
    }

    /// Block until a solution arrives or the pool is shut down.
    pub fn recv_solution(&self) -> Option<Solution> {
        self.solutions.recv().ok()
    }

    /// Signal every worker to exit and join their threads.
    pub fn shutdown(mut self) {
        self.quit.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreadConfig;
    use crate::kernel::EchoKernel;

    fn echo_config(n: usize) -> PoolConfig {
        PoolConfig {
            threads: (0..n)
                .map(|_| ThreadConfig {
                    multiway: crate::kernel::Multiway::Single,
                    cpu_aff: -1,
                })
                .collect(),
        }
    }

    #[test]
    fn pool_starts_and_shuts_down_cleanly() {
        let pool = WorkerPool::start(&echo_config(2), MemoryMode::PrintWarning, |width| {
            Box::new(EchoKernel::new(width))
        });
        assert_eq!(pool.thread_count(), 2);
        pool.shutdown();
    }

    #[test]
    fn switch_work_is_acknowledged_by_every_worker() {
        let pool = WorkerPool::start(&echo_config(3), MemoryMode::PrintWarning, |width| {
            Box::new(EchoKernel::new(width))
        });

        let mut item = WorkItem::stalled();
        item.stall = false;
        item.target = 0; // never a solution, workers just spin hashing
        item.work_size = crate::work::NONCE_OFFSET + 4 + 1;
        pool.switch_work(item);

        std::thread::sleep(Duration::from_millis(50));
        assert!(pool.slot.consume_count() >= 3);
        pool.shutdown();
    }

    #[test]
    fn echo_kernel_solutions_surface_through_the_channel() {
        let pool = WorkerPool::start(&echo_config(1), MemoryMode::PrintWarning, |width| {
            Box::new(EchoKernel::new(width))
        });

        let mut item = WorkItem::stalled();
        item.stall = false;
        item.target = u64::MAX; // every digest is a "solution" under this target
        item.work_size = crate::work::NONCE_OFFSET + 4 + 1;
        item.job_id = *b"jobjobjo";
        pool.switch_work(item);

        let solution = pool.recv_solution().expect("a solution should arrive");
        assert_eq!(solution.job_id, *b"jobjobjo");
        pool.shutdown();
    }
}
