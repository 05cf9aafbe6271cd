//! Cache configuration.
//!
//! Deserializable from the host's `panelgrid.toml` `[cache]` table; every
//! field has a default so an empty table is valid.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_MAX_SIZE: usize = 1000;
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 1024;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries per tier (L1 hard bound, L2 demotion bound).
    pub max_size: usize,
    /// TTL applied when `set` is called without an explicit one.
    pub default_ttl_secs: u64,
    /// Interval between expiry sweeper passes.
    pub cleanup_interval_secs: u64,
    /// Compress payloads above the size threshold.
    pub enable_compression: bool,
    /// Minimum serialized payload size (bytes) before compression applies.
    pub compression_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl_secs: DEFAULT_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            enable_compression: true,
            compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD_BYTES,
        }
    }
}

impl CacheConfig {
    /// Default entry TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Sweeper interval as a duration, clamped to at least one second.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Per-tier capacity, clamped to at least one entry.
    pub fn max_entries(&self) -> usize {
        self.max_size.max(1)
    }
}

/// Logging configuration for [`crate::telemetry::init`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level directive (overridable via `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
