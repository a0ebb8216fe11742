//! One-shot verification that each configured kernel produces the known
//! CryptoNight answer before the pool starts (spec §4.4). A mismatch is
//! fatal; mining never starts. xmr-stak blames "bad compiler optimizations"
//! in this situation and this crate keeps that framing in its error text,
//! since it is frequently the actual cause when SIMD kernels misbehave.

use crate::context::{self, HashContext, MemoryMode};
use crate::kernel::MultiwayKernel;
use crate::work::NONCE_OFFSET;

const TEST_INPUT: &[u8] = b"This is a test";

const EXPECTED_SINGLE: [u8; 32] = [
    0xa0, 0x84, 0xf0, 0x1d, 0x14, 0x37, 0xa0, 0x9c, 0x69, 0x85, 0x40, 0x1b, 0x60, 0xd4, 0x35, 0x54,
    0xae, 0x10, 0x58, 0x02, 0xc5, 0xf5, 0xd8, 0xa9, 0xb3, 0x25, 0x36, 0x49, 0xc0, 0xbe, 0x66, 0x05,
];

/// Double-kernel KAT (spec §8 S2): distinct input, distinct 64-byte output.
const DOUBLE_TEST_INPUT: &[u8] = b"The quick brown fox jumps over the lazy dogThe quick brown fox jumps over the lazy log";
const DOUBLE_WORK_SIZE: usize = 43;
const EXPECTED_DOUBLE_PREFIX: [u8; 8] = [0x3e, 0xbb, 0x7f, 0x9f, 0x7d, 0x27, 0x3d, 0x7c];

/// Build a width-N input buffer: N back-to-back copies of `TEST_INPUT`,
/// padded to `work_size` bytes each (so a real kernel sees a blob it can
/// address by the fixed nonce offset, even though the self-test vector
/// itself doesn't touch the nonce field).
fn single_vector(width: usize, work_size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; width * work_size];
    for lane in 0..width {
        let start = lane * work_size;
        buf[start..start + TEST_INPUT.len()].copy_from_slice(TEST_INPUT);
    }
    buf
}

/// Run the self-test for one kernel. Returns `Ok(())` if every lane of a
/// width-N invocation reproduces N consecutive copies of the expected
/// single-hash digest, `Err(message)` otherwise.
pub fn run(kernel: &mut dyn MultiwayKernel) -> Result<(), String> {
    let width = kernel.width();
    let work_size = NONCE_OFFSET + 4 + 1; // large enough to hold the test vector and a nonce field
    let input = single_vector(width, work_size);
    let mut out = vec![0u8; width * 32];

    let mut ctx: Vec<HashContext> = Vec::with_capacity(width);
    for _ in 0..width {
        match context::allocate(MemoryMode::PrintWarning) {
            Some(c) => ctx.push(c),
            None => return Err("self-test allocation failed".to_string()),
        }
    }

    kernel.hash(&input, work_size, &mut out, &mut ctx);

    for lane in 0..width {
        let digest = &out[lane * 32..lane * 32 + 32];
        if digest != EXPECTED_SINGLE {
            return Err(format!(
                "kernel self-test mismatch at lane {lane} of width {width} \
                 (bad compiler optimizations are the usual cause): \
                 expected {EXPECTED_SINGLE:02x?}, got {digest:02x?}"
            ));
        }
    }
    Ok(())
}

/// Run the double-kernel KAT against a standalone double-width hash
/// function (spec §8 S2). Only checks the 8-byte prefix the spec pins down.
pub fn run_double<F>(double_hash: F) -> Result<(), String>
where
    F: FnOnce(&[u8], usize) -> [u8; 64],
{
    let out = double_hash(DOUBLE_TEST_INPUT, DOUBLE_WORK_SIZE);
    if out[..8] != EXPECTED_DOUBLE_PREFIX {
        return Err(format!(
            "double-kernel self-test mismatch: expected prefix {EXPECTED_DOUBLE_PREFIX:02x?}, \
             got {:02x?}",
            &out[..8]
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::EchoKernel;

    /// A kernel that always reproduces the expected single-hash digest,
    /// regardless of input — the "passes" test double.
    struct GoodKernel {
        width: usize,
    }
    impl MultiwayKernel for GoodKernel {
        fn width(&self) -> usize {
            self.width
        }
        fn hash(&mut self, _blobs: &[u8], _work_size: usize, out: &mut [u8], _ctx: &mut [HashContext]) {
            for lane in 0..self.width {
                out[lane * 32..lane * 32 + 32].copy_from_slice(&EXPECTED_SINGLE);
            }
        }
    }

    #[test]
    fn self_test_passes_for_matching_kernel() {
        for width in [1usize, 2, 4, 5, 6] {
            let mut kernel = GoodKernel { width };
            assert!(run(&mut kernel).is_ok());
        }
    }

    #[test]
    fn self_test_fails_for_mismatching_kernel() {
        let mut kernel = EchoKernel::new(1);
        assert!(run(&mut kernel).is_err());
    }

    #[test]
    fn self_test_reports_failing_lane_in_multiway() {
        struct OneBadLane;
        impl MultiwayKernel for OneBadLane {
            fn width(&self) -> usize {
                2
            }
            fn hash(&mut self, _blobs: &[u8], _work_size: usize, out: &mut [u8], _ctx: &mut [HashContext]) {
                out[0..32].copy_from_slice(&EXPECTED_SINGLE);
                out[32..64].copy_from_slice(&[0u8; 32]);
            }
        }
        let mut kernel = OneBadLane;
        let err = run(&mut kernel).unwrap_err();
        assert!(err.contains("lane 1"));
    }

    #[test]
    fn double_kernel_self_test_passes_with_matching_prefix() {
        let result = run_double(|_input, _work_size| {
            let mut out = [0u8; 64];
            out[..8].copy_from_slice(&EXPECTED_DOUBLE_PREFIX);
            out
        });
        assert!(result.is_ok());
    }

    #[test]
    fn double_kernel_self_test_fails_on_mismatch() {
        let result = run_double(|_input, _work_size| [0u8; 64]);
        assert!(result.is_err());
    }
}
