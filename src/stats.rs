//! Running cache counters and the derived stats report.
//!
//! Counters are process-lifetime and monotonic; `clear()` folds the
//! removed entry count into `deletes` but never resets anything.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lifetime counters, updated on every cache operation.
#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    compressions: AtomicU64,
    decompressions: AtomicU64,
    compressions_skipped: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_compression(&self) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decompression(&self) {
        self.decompressions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compression_skipped(&self) {
        self.compressions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PerformanceReport {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64 * 100.0
        };

        PerformanceReport {
            hits,
            misses,
            hit_rate,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            compressions: self.compressions.load(Ordering::Relaxed),
            decompressions: self.decompressions.load(Ordering::Relaxed),
            compressions_skipped: self.compressions_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Lookup and mutation counters at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, zero when no lookups happened.
    pub hit_rate: f64,
    pub sets: u64,
    pub deletes: u64,
    pub compressions: u64,
    pub decompressions: u64,
    pub compressions_skipped: u64,
}

/// Occupancy of a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierReport {
    /// Entries currently held, live or not.
    pub size: usize,
    /// Entries past their TTL but not yet swept.
    pub expired: usize,
    /// Live entries.
    pub active: usize,
}

/// Full stats snapshot served to the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub l1: TierReport,
    pub l2: TierReport,
    pub total_entries: usize,
    /// Sum of serialized payload sizes; unserializable payloads count 0.
    pub estimated_bytes: usize,
    pub performance: PerformanceReport,
}
