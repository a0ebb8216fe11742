//! FFI boundary to the external CryptoNight-family kernels.
//!
//! Spec §1 treats the hash kernels themselves as an out-of-scope external
//! collaborator, specified only by their input/output contract. This
//! mirrors the teacher's own `salvium-miner-v2::ffi` module, which declares
//! `extern "C"` bindings to a vendored RandomX library rather than
//! implementing RandomX in Rust; here the vendored library is a
//! CryptoNight-family one (the `cryptonight_hash`/`_double_hash`/
//! `_quad_hash`/`_penta_hash`/`_hex_hash` family xmr-stak-style miners
//! expose), linked in by whoever builds this crate for real mining. This
//! module ships the contract and a safe wrapper; it does not vendor or
//! implement the kernel.

use crate::context::{self, HashContext, MemoryMode};
use crate::kernel::MultiwayKernel;

#[allow(dead_code)]
extern "C" {
    /// Single-nonce kernel: one scratchpad in, 32 digest bytes out.
    fn cryptonight_hash(input: *const u8, input_size: usize, output: *mut u8, ctx0: *mut libc::c_void);
    fn cryptonight_double_hash(
        input: *const u8,
        input_size: usize,
        output: *mut u8,
        ctx0: *mut libc::c_void,
        ctx1: *mut libc::c_void,
    );
    fn cryptonight_quad_hash(
        input: *const u8,
        input_size: usize,
        output: *mut u8,
        ctx: *const *mut libc::c_void,
    );
    fn cryptonight_penta_hash(
        input: *const u8,
        input_size: usize,
        output: *mut u8,
        ctx: *const *mut libc::c_void,
    );
    fn cryptonight_hex_hash(
        input: *const u8,
        input_size: usize,
        output: *mut u8,
        ctx: *const *mut libc::c_void,
    );
}

/// A `MultiwayKernel` backed by the external CryptoNight library. Exists
/// for every width the pool supports; the width fixes which `extern "C"`
/// entry point gets called. Linking this symbol in is the integrator's
/// job (e.g. a `build.rs` vendoring the kernel sources), not this crate's —
/// see spec §1 and DESIGN.md.
pub struct CryptonightFfiKernel {
    width: usize,
}

impl CryptonightFfiKernel {
    pub fn new(width: usize) -> Self {
        assert!(
            matches!(width, 1 | 2 | 4 | 5 | 6),
            "unsupported multiway width {width}"
        );
        Self { width }
    }
}

impl MultiwayKernel for CryptonightFfiKernel {
    fn width(&self) -> usize {
        self.width
    }

    fn hash(&mut self, blobs: &[u8], work_size: usize, out: &mut [u8], ctx: &mut [HashContext]) {
        debug_assert_eq!(ctx.len(), self.width);
        unsafe {
            match self.width {
                1 => cryptonight_hash(blobs.as_ptr(), work_size, out.as_mut_ptr(), ctx[0].slow_ptr()),
                2 => cryptonight_double_hash(
                    blobs.as_ptr(),
                    work_size,
                    out.as_mut_ptr(),
                    ctx[0].slow_ptr(),
                    ctx[1].slow_ptr(),
                ),
                width => {
                    let ptrs: Vec<*mut libc::c_void> = ctx.iter().map(|c| c.slow_ptr()).collect();
                    let f = match width {
                        4 => cryptonight_quad_hash,
                        5 => cryptonight_penta_hash,
                        6 => cryptonight_hex_hash,
                        _ => unreachable!(),
                    };
                    f(blobs.as_ptr(), work_size, out.as_mut_ptr(), ptrs.as_ptr());
                }
            }
        }
    }
}

/// Calls `cryptonight_double_hash` directly, outside the `MultiwayKernel`
/// plumbing, in the `FnOnce(&[u8], usize) -> [u8; 64]` shape
/// `selftest::run_double` expects (spec §4.4/§8 S2). Allocates its own pair
/// of lane contexts — self-test only, not part of a worker's context
/// lifecycle.
pub fn double_hash(input: &[u8], work_size: usize) -> [u8; 64] {
    let ctx0 = context::allocate(MemoryMode::PrintWarning)
        .expect("self-test allocation failed for double-kernel KAT");
    let ctx1 = context::allocate(MemoryMode::PrintWarning)
        .expect("self-test allocation failed for double-kernel KAT");
    let mut out = [0u8; 64];
    unsafe {
        cryptonight_double_hash(
            input.as_ptr(),
            work_size,
            out.as_mut_ptr(),
            ctx0.slow_ptr(),
            ctx1.slow_ptr(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "unsupported multiway width")]
    fn rejects_unsupported_width() {
        CryptonightFfiKernel::new(3);
    }
}
