//! Per-worker telemetry ring buffer.
//!
//! Each worker owns one row of `(hash_count, timestamp_ms)` samples. `push`
//! is called by the worker itself and never blocks; `hashrate` is called by
//! the pool (or a caller querying aggregate stats) and walks backward over
//! the ring to find a window boundary.
//!
//! A fixed-size ring bounds memory and serves any window smaller than its
//! time span; it returns NaN rather than an approximate answer when there
//! isn't enough history, which is easy for callers to detect and format.

use std::sync::atomic::{AtomicU64, Ordering};

/// log2 of the ring size. 6 -> 64 samples per worker row.
const RING_BITS: u32 = 6;
const RING_SIZE: usize = 1 << RING_BITS;
const RING_MASK: usize = RING_SIZE - 1;

struct Row {
    hash_count: Vec<AtomicU64>,
    timestamp_ms: Vec<AtomicU64>,
    top: AtomicU64,
}

impl Row {
    fn new() -> Self {
        // All rows must be zero-initialized (every slot, not just row 0 —
        // see spec DESIGN NOTES Open Question on the source's 2-D buffer).
        Self {
            hash_count: (0..RING_SIZE).map(|_| AtomicU64::new(0)).collect(),
            timestamp_ms: (0..RING_SIZE).map(|_| AtomicU64::new(0)).collect(),
            top: AtomicU64::new(0),
        }
    }
}

/// Telemetry ring covering every worker in the pool.
pub struct TelemetryRing {
    rows: Vec<Row>,
}

impl TelemetryRing {
    pub fn new(thread_count: usize) -> Self {
        Self {
            rows: (0..thread_count).map(|_| Row::new()).collect(),
        }
    }

    /// Record a sample for `thread_no`. Never blocks.
    pub fn push(&self, thread_no: usize, hash_count: u64, timestamp_ms: u64) {
        let row = &self.rows[thread_no];
        let idx = (row.top.load(Ordering::Relaxed) as usize) & RING_MASK;
        row.hash_count[idx].store(hash_count, Ordering::Relaxed);
        row.timestamp_ms[idx].store(timestamp_ms, Ordering::Relaxed);
        row.top.fetch_add(1, Ordering::Relaxed);
    }

    /// Hashrate for `thread_no` over the most recent `window_ms`. NaN if
    /// there isn't enough history within the window.
    pub fn hashrate(&self, thread_no: usize, window_ms: u64) -> f64 {
        let row = &self.rows[thread_no];
        let top = row.top.load(Ordering::Relaxed);
        if top == 0 {
            return f64::NAN;
        }

        let latest_idx = ((top - 1) as usize) & RING_MASK;
        let latest_ts = row.timestamp_ms[latest_idx].load(Ordering::Relaxed);
        if latest_ts == 0 {
            return f64::NAN;
        }
        let latest_count = row.hash_count[latest_idx].load(Ordering::Relaxed);

        // Walk backward at most RING_SIZE - 1 steps (one short of wrapping
        // back onto `latest_idx`) looking for the oldest sample whose age
        // is still within the window. `found_window_boundary` only becomes
        // true once a sample's age actually *exceeds* `window_ms` — i.e.
        // the walk has proven the ring's history reaches back past the
        // requested window. Exhausting every available sample without ever
        // crossing that boundary means the ring isn't full within the
        // window (spec §4.3 step 3): we'd be reporting a rate over less
        // than the requested window, so return NaN instead.
        let max_steps = RING_SIZE.min(top as usize) - 1;
        let mut earliest_idx = latest_idx;
        let mut found_window_boundary = false;
        for step in 1..=max_steps {
            let idx = (top as usize + RING_SIZE - 1 - step) & RING_MASK;
            let ts = row.timestamp_ms[idx].load(Ordering::Relaxed);
            if ts == 0 {
                // Hit an unwritten slot before the ring filled — not enough
                // data yet.
                return f64::NAN;
            }
            if latest_ts.saturating_sub(ts) > window_ms {
                found_window_boundary = true;
                break;
            }
            earliest_idx = idx;
        }

        if !found_window_boundary {
            return f64::NAN;
        }

        let earliest_ts = row.timestamp_ms[earliest_idx].load(Ordering::Relaxed);
        let earliest_count = row.hash_count[earliest_idx].load(Ordering::Relaxed);

        if latest_ts == earliest_ts {
            return f64::NAN;
        }

        let delta_hashes = latest_count.saturating_sub(earliest_count) as f64;
        let delta_secs = (latest_ts - earliest_ts) as f64 / 1000.0;
        delta_hashes / delta_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_before_any_sample() {
        let ring = TelemetryRing::new(1);
        assert!(ring.hashrate(0, 10_000).is_nan());
    }

    #[test]
    fn nan_with_single_sample() {
        let ring = TelemetryRing::new(1);
        ring.push(0, 100, 1_000);
        assert!(ring.hashrate(0, 10_000).is_nan());
    }

    #[test]
    fn two_samples_without_a_window_boundary_is_nan() {
        // Only two samples ever recorded, 1000ms apart, queried over a
        // 10s window: the walk never finds a sample whose age exceeds
        // the window, so the ring can't vouch for the full window.
        let ring = TelemetryRing::new(1);
        ring.push(0, 0, 1_000);
        ring.push(0, 1000, 2_000);
        assert!(ring.hashrate(0, 10_000).is_nan());
    }

    #[test]
    fn positive_finite_once_window_boundary_is_confirmed() {
        // A third, older sample pushes history past the window boundary,
        // so the rate between the two in-window samples is trustworthy.
        let ring = TelemetryRing::new(1);
        ring.push(0, 0, 100); // boundary sample, well outside the window
        ring.push(0, 1000, 1_000);
        ring.push(0, 3000, 3_000);
        let hr = ring.hashrate(0, 2_500);
        assert!(hr.is_finite() && hr > 0.0);
        assert!((hr - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn scales_linearly_with_elapsed_time() {
        let ring = TelemetryRing::new(1);
        ring.push(0, 0, 100); // boundary sample
        ring.push(0, 1000, 1_000);
        ring.push(0, 3000, 3_000); // 2000 hashes / 2s = 1000 H/s
        let hr = ring.hashrate(0, 2_500);
        assert!((hr - 1000.0).abs() < 1e-9);

        let ring2 = TelemetryRing::new(1);
        ring2.push(0, 0, 100); // boundary sample
        ring2.push(0, 2000, 1_000);
        ring2.push(0, 6000, 5_000); // 4000 hashes / 4s = 1000 H/s
        let hr2 = ring2.hashrate(0, 4_500);
        assert!((hr2 - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn ignores_samples_older_than_window() {
        let ring = TelemetryRing::new(1);
        ring.push(0, 0, 1_000);
        ring.push(0, 10_000, 500_000); // way outside the window
        ring.push(0, 10_100, 501_000);
        let hr = ring.hashrate(0, 5_000);
        // Only the last two samples (1000ms apart) should count.
        assert!((hr - 100.0).abs() < 1e-9);
    }

    #[test]
    fn equal_timestamps_yield_nan() {
        let ring = TelemetryRing::new(1);
        ring.push(0, 0, 5_000);
        ring.push(0, 500, 5_000);
        assert!(ring.hashrate(0, 10_000).is_nan());
    }

    #[test]
    fn all_rows_zero_initialized_not_just_row_zero() {
        let ring = TelemetryRing::new(4);
        for t in 0..4 {
            assert!(ring.hashrate(t, 1_000).is_nan());
        }
    }

    #[test]
    fn ring_wraps_without_panicking() {
        let ring = TelemetryRing::new(1);
        for i in 0..(RING_SIZE as u64 * 3) {
            ring.push(0, i * 10, 1_000 + i * 100);
        }
        // The window far exceeds even the full ring's recorded span (64
        // samples spaced 100ms apart covers ~6.3s): nothing confirms the
        // window boundary, so this must be NaN rather than a spuriously
        // "finite" rate computed over less history than was asked for.
        assert!(ring.hashrate(0, 1_000_000).is_nan());
        // A window comfortably inside the full ring's span is still
        // answerable without panicking across the wrap.
        assert!(ring.hashrate(0, 500).is_finite());
    }
}
