//! The hash kernel boundary.
//!
//! The CryptoNight-family hash functions themselves are out of scope for
//! this crate (spec §1) — they are a pure function of "work blob in, N×32
//! result bytes out" and are supplied by the caller, one variant per lane
//! width. This mirrors the teacher's `HashAlgorithm` trait (`mining.rs`),
//! generalized from single-hash to multiway.

/// Supported kernel widths. One worker config entry selects exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Multiway {
    Single = 1,
    Double = 2,
    Quad = 4,
    Pent = 5,
    Hex = 6,
}

impl Multiway {
    pub fn width(self) -> usize {
        self as usize
    }

    pub fn from_width(width: usize) -> Option<Self> {
        match width {
            1 => Some(Self::Single),
            2 => Some(Self::Double),
            4 => Some(Self::Quad),
            5 => Some(Self::Pent),
            6 => Some(Self::Hex),
            _ => None,
        }
    }
}

/// A hash kernel processing `width()` nonces per invocation.
///
/// `hash` is given `width()` concatenated copies of the work blob (each
/// `work_size` bytes, with its own nonce already spliced in by the caller),
/// one scratchpad context per lane, and must write `width() * 32` bytes of
/// digest to `out`, lane N's digest at `out[N*32..N*32+32]`.
pub trait MultiwayKernel: Send {
    fn width(&self) -> usize;
    fn hash(
        &mut self,
        blobs: &[u8],
        work_size: usize,
        out: &mut [u8],
        ctx: &mut [crate::context::HashContext],
    );
}

/// A deterministic test double: each lane's digest is the caller-supplied
/// 32-byte pattern for that lane's nonce, found by reading the nonce the
/// caller spliced into the blob. Used only to exercise worker/pool/selftest
/// plumbing in this crate's own tests — never shipped as a production
/// kernel (spec §1: the real kernels are an external collaborator).
pub struct EchoKernel {
    width: usize,
}

impl EchoKernel {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl MultiwayKernel for EchoKernel {
    fn width(&self) -> usize {
        self.width
    }

    fn hash(
        &mut self,
        blobs: &[u8],
        work_size: usize,
        out: &mut [u8],
        _ctx: &mut [crate::context::HashContext],
    ) {
        for lane in 0..self.width {
            let blob = &blobs[lane * work_size..(lane + 1) * work_size];
            let nonce = &blob[crate::work::NONCE_OFFSET..crate::work::NONCE_OFFSET + 4];
            let digest = &mut out[lane * 32..lane * 32 + 32];
            digest[0..4].copy_from_slice(nonce);
            for b in digest[4..].iter_mut() {
                *b = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiway_width_roundtrip() {
        for w in [1usize, 2, 4, 5, 6] {
            assert_eq!(Multiway::from_width(w).unwrap().width(), w);
        }
        assert!(Multiway::from_width(3).is_none());
    }

    #[test]
    fn echo_kernel_produces_consecutive_nonce_digests() {
        let mut kernel = EchoKernel::new(2);
        let work_size = 76;
        let mut blobs = vec![0u8; work_size * 2];
        blobs[crate::work::NONCE_OFFSET..crate::work::NONCE_OFFSET + 4]
            .copy_from_slice(&7u32.to_le_bytes());
        blobs[work_size + crate::work::NONCE_OFFSET..work_size + crate::work::NONCE_OFFSET + 4]
            .copy_from_slice(&8u32.to_le_bytes());
        let mut out = vec![0u8; 64];
        kernel.hash(&blobs, work_size, &mut out, &mut []);
        assert_eq!(&out[0..4], &7u32.to_le_bytes());
        assert_eq!(&out[32..36], &8u32.to_le_bytes());
    }
}
