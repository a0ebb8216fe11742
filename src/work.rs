//! Work items, the global work slot, and the publish/consume protocol.
//!
//! A single producer (the external executor) publishes `WorkItem`s through
//! `GlobalWorkSlot::switch_work`; workers observe the generation bump and
//! copy the item by value. See `pool::WorkerPool::switch_work` for the
//! spin-poll that guards the publish side.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Maximum length of the hash pre-image blob.
pub const MAX_BLOB_SIZE: usize = 112;

/// Offset of the 4-byte little-endian nonce field inside `work_blob`.
pub const NONCE_OFFSET: usize = 39;

/// A unit of work handed from the executor to the pool.
#[derive(Clone)]
pub struct WorkItem {
    /// Opaque 8-byte job identifier, echoed on any solution found under it.
    pub job_id: [u8; 8],
    /// Hash pre-image. Only the first `work_size` bytes are meaningful.
    pub work_blob: [u8; MAX_BLOB_SIZE],
    /// Actual length of `work_blob`.
    pub work_size: usize,
    /// A hash is a solution iff its trailing little-endian 64-bit word is
    /// strictly less than this value.
    pub target: u64,
    /// Starting nonce assigned to the worker that will consume this item.
    pub resume_nonce: u32,
    /// If true, only the low 24 bits of the nonce increment; the top byte
    /// is reserved for a pool-assigned identifier.
    pub nicehash: bool,
    /// Routing tag echoed on any solution found under this item.
    pub pool_id: u32,
    /// If true, there is no current work; workers should wait.
    pub stall: bool,
}

impl WorkItem {
    /// A stalled placeholder item. Workers spin-wait on this until the
    /// executor publishes real work.
    pub fn stalled() -> Self {
        Self {
            job_id: [0u8; 8],
            work_blob: [0u8; MAX_BLOB_SIZE],
            work_size: 0,
            target: 0,
            resume_nonce: 0,
            nicehash: false,
            pool_id: 0,
            stall: true,
        }
    }

    /// Read the 32-bit nonce currently stored at `NONCE_OFFSET`.
    pub fn read_nonce(&self) -> u32 {
        u32::from_le_bytes(
            self.work_blob[NONCE_OFFSET..NONCE_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Write a 32-bit nonce at `NONCE_OFFSET`.
    pub fn write_nonce(&mut self, nonce: u32) {
        self.work_blob[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
    }
}

/// A found solution, ready for the executor to push to the pool.
#[derive(Clone, Debug)]
pub struct Solution {
    pub job_id: [u8; 8],
    pub nonce: u32,
    pub digest: [u8; 32],
    pub pool_id: u32,
}

/// Process-wide shared slot: one `current_work`, a monotonic generation
/// counter, and a count of workers that have consumed the current generation.
pub struct GlobalWorkSlot {
    current_work: Mutex<WorkItem>,
    global_job_no: AtomicU64,
    consume_count: AtomicUsize,
    thread_count: usize,
}

impl GlobalWorkSlot {
    pub fn new(thread_count: usize, initial: WorkItem) -> Self {
        Self {
            current_work: Mutex::new(initial),
            global_job_no: AtomicU64::new(0),
            consume_count: AtomicUsize::new(0),
            thread_count,
        }
    }

    /// Current generation, acquire-ordered so a worker that observes a new
    /// value is guaranteed to see the `current_work` store that preceded it.
    pub fn job_no(&self) -> u64 {
        self.global_job_no.load(Ordering::Acquire)
    }

    /// Copy the current work item and record this worker's consumption of
    /// the generation it was published under.
    pub fn consume(&self) -> (WorkItem, u64) {
        let job_no = self.global_job_no.load(Ordering::Acquire);
        let item = self.current_work.lock().unwrap().clone();
        self.consume_count.fetch_add(1, Ordering::Release);
        (item, job_no)
    }

    /// How many workers have consumed the current generation.
    pub fn consume_count(&self) -> usize {
        self.consume_count.load(Ordering::Acquire)
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Publish a new work item. Caller (the pool) must already have waited
    /// for `consume_count == thread_count` under the prior generation.
    pub fn publish(&self, item: WorkItem) {
        *self.current_work.lock().unwrap() = item;
        self.consume_count.store(0, Ordering::Release);
        self.global_job_no.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_roundtrip() {
        let mut w = WorkItem::stalled();
        w.write_nonce(0xDEAD_BEEF);
        assert_eq!(w.read_nonce(), 0xDEAD_BEEF);
    }

    #[test]
    fn publish_bumps_generation_and_resets_consume_count() {
        let slot = GlobalWorkSlot::new(3, WorkItem::stalled());
        assert_eq!(slot.job_no(), 0);
        let (_, job_no) = slot.consume();
        assert_eq!(job_no, 0);
        assert_eq!(slot.consume_count(), 1);

        let mut next = WorkItem::stalled();
        next.stall = false;
        next.target = 42;
        slot.publish(next);

        assert_eq!(slot.job_no(), 1);
        assert_eq!(slot.consume_count(), 0);
        let (item, job_no) = slot.consume();
        assert_eq!(job_no, 1);
        assert_eq!(item.target, 42);
        assert_eq!(slot.consume_count(), 1);
    }

    #[test]
    fn monotonic_generation_across_multiple_publishes() {
        let slot = GlobalWorkSlot::new(1, WorkItem::stalled());
        let mut last = slot.job_no();
        for _ in 0..5 {
            slot.publish(WorkItem::stalled());
            let now = slot.job_no();
            assert!(now > last);
            last = now;
        }
    }
}
