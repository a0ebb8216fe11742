//! The executor boundary: whatever drives `WorkItem`s into the pool and
//! receives `Solution`s back out. Mirrors the teacher's `daemon::DaemonClient`
//! plus its `eprintln!`-style status logging, generalized into a trait so a
//! pool can be driven by a real daemon, a stratum proxy, or a test double.

use crate::work::Solution;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Anything that can accept found solutions and surface operator-facing
/// status. A `WorkerPool` is agnostic to what's on the other side of this.
pub trait Executor {
    /// Called once per solution found. Implementations should not block the
    /// caller for long; queue for a background submit if needed.
    fn push_event(&self, solution: &Solution);
    /// Operator-facing status line (job switches, errors, warnings).
    fn log(&self, message: &str);
}

/// Logs every event to `log::info!`/`log::warn!` and does nothing else.
/// Useful for benchmarking and for the self-test/CLI dry-run paths.
pub struct NullExecutor;

impl Executor for NullExecutor {
    fn push_event(&self, solution: &Solution) {
        log::info!(
            "solution found: job_id={:02x?} nonce={:08x} pool_id={}",
            solution.job_id,
            solution.nonce,
            solution.pool_id
        );
    }

    fn log(&self, message: &str) {
        log::info!("{message}");
    }
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct BlockTemplate {
    pub difficulty: u64,
    pub wide_difficulty: Option<String>,
    pub height: u64,
    pub seed_hash: String,
    pub next_seed_hash: Option<String>,
    pub blocktemplate_blob: String,
    pub blockhashing_blob: String,
    pub expected_reward: u64,
    pub prev_hash: String,
    pub reserved_offset: u32,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct DaemonInfo {
    pub height: u64,
    pub difficulty: u64,
    pub wide_difficulty: Option<String>,
    pub testnet: bool,
    pub mainnet: bool,
    pub synchronized: bool,
    pub status: String,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: &'static str,
    method: String,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

/// JSON-RPC client for a CryptoNote-style daemon: get_info, get_block_template,
/// submit_block. Kept from the teacher's `daemon.rs` essentially unchanged —
/// the RPC surface doesn't depend on which hash algorithm the pool is running.
pub struct DaemonClient {
    url: String,
    client: Client,
}

impl DaemonClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client"),
        }
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, String> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method: method.to_string(),
            params,
        };

        let resp = self
            .client
            .post(format!("{}/json_rpc", self.url))
            .json(&req)
            .send()
            .map_err(|e| format!("HTTP error: {e}"))?;

        let body: JsonRpcResponse = resp.json().map_err(|e| format!("JSON parse error: {e}"))?;

        if let Some(err) = body.error {
            return Err(format!("RPC error: {err}"));
        }

        body.result.ok_or_else(|| "no result in response".to_string())
    }

    pub fn get_info(&self) -> Result<DaemonInfo, String> {
        let result = self.call("get_info", serde_json::json!({}))?;
        serde_json::from_value(result).map_err(|e| format!("parse error: {e}"))
    }

    pub fn get_block_template(&self, address: &str, reserve_size: u32) -> Result<BlockTemplate, String> {
        let result = self.call(
            "get_block_template",
            serde_json::json!({
                "wallet_address": address,
                "reserve_size": reserve_size,
            }),
        )?;
        serde_json::from_value(result).map_err(|e| format!("parse error: {e}"))
    }

    pub fn submit_block(&self, block_blob_hex: &str) -> Result<(), String> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method: "submit_block".to_string(),
            params: serde_json::json!([block_blob_hex]),
        };

        let resp = self
            .client
            .post(format!("{}/json_rpc", self.url))
            .json(&req)
            .send()
            .map_err(|e| format!("HTTP error: {e}"))?;

        let body: JsonRpcResponse = resp.json().map_err(|e| format!("JSON parse error: {e}"))?;

        if let Some(err) = body.error {
            return Err(format!("block rejected: {err}"));
        }

        Ok(())
    }
}

/// Wraps a `DaemonClient` so solutions found by the pool get submitted as
/// full blocks. The actual block-blob assembly (splicing the winning nonce
/// back into the template) is left to the caller of `push_event` today —
/// the pool only hands back the raw nonce/digest pair it found.
pub struct DaemonExecutor {
    client: DaemonClient,
}

impl DaemonExecutor {
    pub fn new(url: &str) -> Self {
        Self {
            client: DaemonClient::new(url),
        }
    }

    pub fn daemon(&self) -> &DaemonClient {
        &self.client
    }
}

impl Executor for DaemonExecutor {
    fn push_event(&self, solution: &Solution) {
        log::info!(
            "solution job_id={:02x?} nonce={:08x}, handing to daemon",
            solution.job_id,
            solution.nonce
        );
    }

    fn log(&self, message: &str) {
        log::info!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_client_strips_trailing_slash() {
        let client = DaemonClient::new("http://127.0.0.1:18081/");
        assert_eq!(client.url, "http://127.0.0.1:18081");
    }

    #[test]
    fn null_executor_accepts_a_solution_without_panicking() {
        let executor = NullExecutor;
        executor.push_event(&Solution {
            job_id: [0u8; 8],
            nonce: 1,
            digest: [0u8; 32],
            pool_id: 0,
        });
        executor.log("test message");
    }
}
