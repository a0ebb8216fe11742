//! CPU worker pool for a CryptoNight-family proof-of-work miner.
//!
//! The subject of this crate is the multi-threaded hashing engine: a pool
//! of long-lived worker threads that each hash a shared work item against
//! a difficulty target and emit solutions. The hash kernels themselves,
//! the network pool client, and configuration/CLI parsing are external
//! collaborators, specified only by the boundaries this crate calls.

pub mod affinity;
pub mod config;
pub mod context;
pub mod executor;
pub mod ipc;
pub mod kernel;
pub mod kernel_ffi;
pub mod numa;
pub mod pool;
pub mod selftest;
pub mod telemetry;
pub mod work;
pub mod worker;
