//! IPC mode: JSON-lines protocol over stdin/stdout.
//!
//! The parent process sends commands on stdin and receives events on
//! stdout; every message is a single line of JSON. Generalized from the
//! teacher's RandomX-specific fields to the crate's `WorkItem`/`Solution`
//! wire shapes (spec §6).
//!
//! ## Protocol
//!
//! ### Parent → Pool (stdin)
//!
//! **job** — Start mining a new job.
//! ```json
//! {"method":"job","job_id":"1","work_blob":"...","work_size":76,"target":4000,"nicehash":false,"pool_id":0}
//! ```
//!
//! **stall** — No work available; workers should wait.
//! ```json
//! {"method":"stall"}
//! ```
//!
//! **shutdown** — Exit the process.
//! ```json
//! {"method":"shutdown"}
//! ```
//!
//! ### Pool → Parent (stdout)
//!
//! **ready** — Workers spawned.
//! ```json
//! {"event":"ready","threads":7}
//! ```
//!
//! **hashrate** — Periodic stats (every 5s).
//! ```json
//! {"event":"hashrate","hashrate":2720.5}
//! ```
//!
//! **solution** — Solution found.
//! ```json
//! {"event":"solution","job_id":"1","nonce":12345,"digest":"...","pool_id":0}
//! ```
//!
//! **error** — Something went wrong.
//! ```json
//! {"event":"error","message":"..."}
//! ```

use crate::pool::WorkerPool;
use crate::work::WorkItem;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[derive(Deserialize)]
struct InMessage {
    method: String,
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    work_blob: String,
    #[serde(default)]
    work_size: usize,
    #[serde(default)]
    target: u64,
    #[serde(default)]
    nicehash: bool,
    #[serde(default)]
    pool_id: u32,
}

#[derive(Serialize)]
struct OutMessage {
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hashrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl OutMessage {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            threads: None,
            hashrate: None,
            job_id: None,
            nonce: None,
            digest: None,
            pool_id: None,
            message: None,
        }
    }
}

fn send(msg: &OutMessage) {
    let mut stdout = io::stdout().lock();
    let _ = serde_json::to_writer(&mut stdout, msg);
    let _ = stdout.write_all(b"\n");
    let _ = stdout.flush();
}

fn send_error(msg: &str) {
    let mut out = OutMessage::new("error");
    out.message = Some(msg.to_string());
    send(&out);
}

enum StdinEvent {
    Line(String),
    Eof,
}

fn job_id_from_str(s: &str) -> [u8; 8] {
    let mut id = [0u8; 8];
    let bytes = s.as_bytes();
    let n = bytes.len().min(8);
    id[..n].copy_from_slice(&bytes[..n]);
    id
}

fn job_id_to_string(id: &[u8; 8]) -> String {
    String::from_utf8_lossy(id).trim_end_matches('\0').to_string()
}

/// Run the pool under IPC control until stdin closes or a shutdown command
/// arrives.
pub fn run_ipc(pool: WorkerPool) {
    eprintln!("[IPC] waiting for commands on stdin (threads={})", pool.thread_count());

    let (stdin_tx, stdin_rx) = mpsc::channel::<StdinEvent>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    if stdin_tx.send(StdinEvent::Line(l)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = stdin_tx.send(StdinEvent::Eof);
    });

    let mut out = OutMessage::new("ready");
    out.threads = Some(pool.thread_count());
    send(&out);

    let mut last_stats = Instant::now();

    loop {
        for solution in pool.try_recv_solutions() {
            let mut out = OutMessage::new("solution");
            out.job_id = Some(job_id_to_string(&solution.job_id));
            out.nonce = Some(solution.nonce);
            out.digest = Some(hex::encode(solution.digest));
            out.pool_id = Some(solution.pool_id);
            send(&out);
        }

        if last_stats.elapsed() > Duration::from_secs(5) {
            let mut out = OutMessage::new("hashrate");
            out.hashrate = Some(pool.total_hashrate(10_000));
            send(&out);
            last_stats = Instant::now();
        }

        let event = stdin_rx.recv_timeout(Duration::from_millis(100));
        let line = match event {
            Ok(StdinEvent::Line(l)) => l,
            Ok(StdinEvent::Eof) => {
                eprintln!("[IPC] stdin closed, shutting down");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                eprintln!("[IPC] stdin thread disconnected");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: InMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                send_error(&format!("invalid JSON: {e}"));
                continue;
            }
        };

        match msg.method.as_str() {
            "job" => {
                let work_blob = match hex::decode(&msg.work_blob) {
                    Ok(b) => b,
                    Err(e) => {
                        send_error(&format!("invalid work_blob hex: {e}"));
                        continue;
                    }
                };
                if work_blob.len() > crate::work::MAX_BLOB_SIZE {
                    send_error("work_blob exceeds maximum blob size");
                    continue;
                }

                let mut item = WorkItem::stalled();
                item.job_id = job_id_from_str(&msg.job_id);
                item.work_blob[..work_blob.len()].copy_from_slice(&work_blob);
                item.work_size = msg.work_size;
                item.target = msg.target;
                item.nicehash = msg.nicehash;
                item.pool_id = msg.pool_id;
                item.stall = false;

                pool.switch_work(item);
                eprintln!("[IPC] job {} started", msg.job_id);
            }
            "stall" => {
                pool.stall();
            }
            "shutdown" => {
                eprintln!("[IPC] shutdown requested");
                break;
            }
            other => {
                send_error(&format!("unknown method: {other}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrips_through_bytes() {
        let id = job_id_from_str("abc123");
        assert_eq!(job_id_to_string(&id), "abc123");
    }

    #[test]
    fn job_id_truncates_to_eight_bytes() {
        let id = job_id_from_str("123456789");
        assert_eq!(job_id_to_string(&id), "12345678");
    }
}
