//! Configuration management for walcache.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration for a walcache instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// TCC barrier configuration.
    pub barrier: BarrierConfig,
    /// Dirty-flusher configuration.
    pub flush: FlushConfig,
    /// redb database configuration (KV back end only).
    pub redb: RedbConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::Error::Io)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed.
    pub fn parse(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }
}

/// TCC barrier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarrierConfig {
    /// Barrier name, the first segment of every barrier key. Keys from
    /// different logical caches sharing one store must use distinct names.
    pub name: String,
    /// Barrier table name (SQL back end).
    pub sql_table: String,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self { name: "walcache".to_string(), sql_table: "tcc_barrier".to_string() }
    }
}

/// Dirty-flusher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Interval between flush passes, in seconds.
    pub interval_secs: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl FlushConfig {
    /// Configuration for maximum durability: flush every second.
    #[must_use]
    pub fn durable() -> Self {
        Self { interval_secs: 1 }
    }
}

/// redb database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedbConfig {
    /// Path of the database file.
    pub path: PathBuf,
    /// Cache size in bytes for the database.
    /// Default: 64 MiB (67108864 bytes).
    pub cache_size_bytes: u64,
    /// Fsync every commit. Disabling trades durability for throughput.
    pub durable_writes: bool,
}

impl Default for RedbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("walcache.redb"),
            cache_size_bytes: 64 * 1024 * 1024, // 64 MiB
            durable_writes: true,
        }
    }
}

impl RedbConfig {
    /// Configuration optimized for maximum performance.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            cache_size_bytes: 128 * 1024 * 1024, // 128 MiB cache
            durable_writes: false,
            ..Default::default()
        }
    }
}
