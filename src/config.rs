//! Pool configuration: number of worker threads, each one's multiway width
//! and CPU pinning, and the scratchpad memory policy (spec §6).
//!
//! Mirrors the teacher's `serde`-derived config structs (`miner.rs`), with
//! JSON as the on-disk format via `serde_json`.

use crate::context::MemoryMode;
use crate::kernel::Multiway;
use serde::{Deserialize, Serialize};

/// Per-thread mining configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Lane width this thread's kernel will run at.
    #[serde(default = "default_multiway")]
    pub multiway: Multiway,
    /// CPU to pin this thread to, or -1 for no pinning.
    #[serde(default = "default_cpu_aff")]
    pub cpu_aff: i32,
}

fn default_multiway() -> Multiway {
    Multiway::Single
}

fn default_cpu_aff() -> i32 {
    -1
}

/// Top-level pool configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub threads: Vec<ThreadConfig>,
}

impl PoolConfig {
    /// One unpinned single-width thread per logical CPU (spec §6 default).
    pub fn default_for_host() -> Self {
        let n = num_cpus::get().max(1);
        Self {
            threads: (0..n)
                .map(|_| ThreadConfig {
                    multiway: Multiway::Single,
                    cpu_aff: -1,
                })
                .collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid pool config: {e}"))
    }

    pub fn to_json_pretty(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))
    }
}

/// Parse the scratchpad memory policy name used in config files and the CLI.
pub fn parse_mem_mode(name: &str) -> Result<MemoryMode, String> {
    match name {
        "never" => Ok(MemoryMode::NeverUseLarge),
        "no-mlock" => Ok(MemoryMode::NoMlock),
        "warn" => Ok(MemoryMode::PrintWarning),
        "always" => Ok(MemoryMode::AlwaysUseLarge),
        other => Err(format!("unknown memory mode '{other}'")),
    }
}

impl Serialize for Multiway {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.width() as u64)
    }
}

impl<'de> Deserialize<'de> for Multiway {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let width = u64::deserialize(deserializer)? as usize;
        Multiway::from_width(width)
            .ok_or_else(|| serde::de::Error::custom(format!("unsupported multiway width {width}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_host_has_one_thread_per_cpu() {
        let cfg = PoolConfig::default_for_host();
        assert_eq!(cfg.threads.len(), num_cpus::get().max(1));
        assert!(cfg.threads.iter().all(|t| t.cpu_aff == -1));
    }

    #[test]
    fn json_roundtrip_preserves_multiway_and_affinity() {
        let cfg = PoolConfig {
            threads: vec![
                ThreadConfig { multiway: Multiway::Quad, cpu_aff: 0 },
                ThreadConfig { multiway: Multiway::Single, cpu_aff: -1 },
            ],
        };
        let json = cfg.to_json_pretty().unwrap();
        let parsed = PoolConfig::from_json(&json).unwrap();
        assert_eq!(parsed.threads[0].multiway.width(), 4);
        assert_eq!(parsed.threads[0].cpu_aff, 0);
        assert_eq!(parsed.threads[1].cpu_aff, -1);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: PoolConfig = PoolConfig::from_json(r#"{"threads":[{}]}"#).unwrap();
        assert_eq!(parsed.threads[0].multiway.width(), 1);
        assert_eq!(parsed.threads[0].cpu_aff, -1);
    }

    #[test]
    fn unknown_mem_mode_is_rejected() {
        assert!(parse_mem_mode("bogus").is_err());
        assert!(parse_mem_mode("warn").is_ok());
    }
}
