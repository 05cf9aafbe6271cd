//! Tiered cache storage and the get/set engine.
//!
//! Two bounded key→entry maps: L1 is the primary tier consulted first on
//! every lookup, L2 the overflow/backstop tier that receives LRU
//! demotions and low-priority insertions. A single lock spans both tiers
//! so no operation ever observes another half-applied.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, CacheLevel, StoredPayload};
use crate::lock::{read_or_recover, write_or_recover};
use crate::stats::{CacheStats, StatsReport, TierReport};
use crate::sweeper::SweeperHandle;
use crate::warm::WarmQueue;

pub(crate) const METRIC_HIT_TOTAL: &str = "panelcache_hit_total";
pub(crate) const METRIC_MISS_TOTAL: &str = "panelcache_miss_total";
pub(crate) const METRIC_EVICT_TOTAL: &str = "panelcache_evict_total";
pub(crate) const METRIC_COMPRESSION_SKIPPED_TOTAL: &str = "panelcache_compression_skipped_total";

// L1 occupancy fractions. New insertions spill over to L2 at 80% of
// capacity; the sweeper triggers an eviction above 90%.
const L1_OVERFLOW_NUM: usize = 4;
const L1_OVERFLOW_DEN: usize = 5;
pub(crate) const L1_PRESSURE_NUM: usize = 9;
pub(crate) const L1_PRESSURE_DEN: usize = 10;

/// Per-call insertion options.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Force the target tier; `None` lets occupancy decide.
    pub level: Option<CacheLevel>,
    /// Labels for bulk invalidation, write-once.
    pub tags: Vec<String>,
    /// Per-call compression override; `Some(false)` disables it.
    pub compress: Option<bool>,
}

#[derive(Debug, Default)]
pub(crate) struct Tiers {
    pub(crate) l1: HashMap<String, CacheEntry>,
    pub(crate) l2: HashMap<String, CacheEntry>,
}

/// Multi-tier response cache.
///
/// Lookups have no single-flight guarantee: two concurrent misses for the
/// same key each trigger independent population work in the caller.
pub struct ResponseCache {
    config: CacheConfig,
    pub(crate) tiers: RwLock<Tiers>,
    pub(crate) stats: CacheStats,
    pub(crate) warm: WarmQueue,
    pub(crate) sweeper: SweeperHandle,
}

impl ResponseCache {
    /// Create a new cache with the given configuration.
    ///
    /// The expiry sweeper is not started; call
    /// [`start_sweeper`](Self::start_sweeper) on the owning `Arc`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            tiers: RwLock::new(Tiers::default()),
            stats: CacheStats::default(),
            warm: WarmQueue::new(),
            sweeper: SweeperHandle::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Look up a key, probing L1 then L2.
    ///
    /// A live L2 entry is promoted: copied into L1 while the L2 shadow
    /// stays in place. Expired entries found along the way are removed
    /// from both tiers and the lookup counts as a miss. A payload that
    /// fails to decompress is dropped and reported as a miss rather than
    /// an error.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = OffsetDateTime::now_utc();
        let mut tiers = write_or_recover(&self.tiers, "get");

        let mut found_expired = false;

        let l1_live = match tiers.l1.get(key) {
            Some(entry) if !entry.is_expired(now) => true,
            Some(_) => {
                found_expired = true;
                false
            }
            None => false,
        };
        if l1_live {
            return self.finish_hit(&mut tiers, key, now, CacheLevel::L1);
        }

        let promoted = match tiers.l2.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.clone()),
            Some(_) => {
                found_expired = true;
                None
            }
            None => None,
        };
        if let Some(mut entry) = promoted {
            entry.level = CacheLevel::L1;
            if tiers.l1.len() >= self.config.max_entries() && !tiers.l1.contains_key(key) {
                self.evict_locked(&mut tiers);
            }
            tiers.l1.insert(key.to_string(), entry);
            debug!(key, "promoted entry from l2");
            return self.finish_hit(&mut tiers, key, now, CacheLevel::L2);
        }

        if found_expired {
            tiers.l1.remove(key);
            tiers.l2.remove(key);
        }
        self.stats.record_miss();
        counter!(METRIC_MISS_TOTAL).increment(1);
        None
    }

    /// Decode the (already promoted) L1 entry and record the hit.
    fn finish_hit(
        &self,
        tiers: &mut Tiers,
        key: &str,
        now: OffsetDateTime,
        served_from: CacheLevel,
    ) -> Option<Value> {
        let mut decompressed = false;
        let decoded = match &tiers.l1.get(key)?.payload {
            StoredPayload::Plain(value) => Ok(value.clone()),
            StoredPayload::Compressed(bytes) => {
                let result = codec::decode(bytes);
                decompressed = result.is_ok();
                result
            }
        };

        match decoded {
            Ok(value) => {
                if let Some(entry) = tiers.l1.get_mut(key) {
                    entry.last_accessed = now;
                    entry.access_count += 1;
                }
                if decompressed {
                    self.stats.record_decompression();
                }
                self.stats.record_hit();
                counter!(METRIC_HIT_TOTAL, "tier" => served_from.as_str()).increment(1);
                debug!(cache = served_from.as_str(), outcome = "hit", key, "serving cached value");
                Some(value)
            }
            Err(error) => {
                warn!(key, error = %error, "dropping entry with undecodable payload");
                tiers.l1.remove(key);
                tiers.l2.remove(key);
                self.stats.record_miss();
                counter!(METRIC_MISS_TOTAL).increment(1);
                None
            }
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert a value under a key.
    ///
    /// When L1 is at capacity one LRU eviction runs first. The entry
    /// lands in L2 when explicitly requested or when L1 occupancy is at
    /// or above 80%; otherwise in L1. Any stale copy of the key in the
    /// other tier is removed.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>, options: SetOptions) {
        let now = OffsetDateTime::now_utc();
        let mut tiers = write_or_recover(&self.tiers, "set");

        if tiers.l1.len() >= self.config.max_entries() {
            self.evict_locked(&mut tiers);
        }

        let expires_at = now + ttl.unwrap_or_else(|| self.config.default_ttl());
        let payload = self.encode_payload(value, &options);

        let level = if options.level == Some(CacheLevel::L2)
            || tiers.l1.len() * L1_OVERFLOW_DEN >= self.config.max_entries() * L1_OVERFLOW_NUM
        {
            CacheLevel::L2
        } else {
            CacheLevel::L1
        };

        let entry = CacheEntry {
            payload,
            expires_at,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            tags: options.tags.into_iter().collect(),
            level,
        };

        match level {
            CacheLevel::L1 => {
                tiers.l2.remove(key);
                tiers.l1.insert(key.to_string(), entry);
            }
            CacheLevel::L2 => {
                tiers.l1.remove(key);
                tiers.l2.insert(key.to_string(), entry);
            }
        }

        self.stats.record_set();
        debug!(cache = level.as_str(), key, "stored entry");
    }

    /// Compress the payload when configured, above the size threshold and
    /// not disabled per call. Encoding failure falls back to the raw
    /// value and counts as a skipped compression, never an error.
    fn encode_payload(&self, value: Value, options: &SetOptions) -> StoredPayload {
        if !self.config.enable_compression || options.compress == Some(false) {
            return StoredPayload::Plain(value);
        }

        let serialized_len = codec::serialized_len(&value);
        if serialized_len <= self.config.compression_threshold_bytes {
            return StoredPayload::Plain(value);
        }

        match codec::encode(&value) {
            Ok(bytes) => {
                self.stats.record_compression();
                StoredPayload::Compressed(bytes)
            }
            Err(error) => {
                warn!(
                    error = %error,
                    serialized_len,
                    "compression failed, storing payload uncompressed"
                );
                self.stats.record_compression_skipped();
                counter!(METRIC_COMPRESSION_SKIPPED_TOTAL).increment(1);
                StoredPayload::Plain(value)
            }
        }
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Evict the least-recently-used L1 entry.
    ///
    /// The victim is demoted into L2 while L2 has room, otherwise dropped.
    pub fn evict_lru(&self) {
        let mut tiers = write_or_recover(&self.tiers, "evict_lru");
        self.evict_locked(&mut tiers);
    }

    // Linear scan bounded by max_size; fine at the intended scale of
    // hundreds to low thousands of entries.
    pub(crate) fn evict_locked(&self, tiers: &mut Tiers) {
        let Some(victim) = tiers
            .l1
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone())
        else {
            return;
        };
        let Some(mut entry) = tiers.l1.remove(&victim) else {
            return;
        };

        if tiers.l2.len() < self.config.max_entries() {
            entry.level = CacheLevel::L2;
            tiers.l2.insert(victim.clone(), entry);
            debug!(key = %victim, "demoted LRU entry to l2");
        } else {
            debug!(key = %victim, "dropped LRU entry, l2 full");
        }
        counter!(METRIC_EVICT_TOTAL).increment(1);
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Remove the key from both tiers. Returns whether anything was found.
    pub fn delete(&self, key: &str) -> bool {
        let mut tiers = write_or_recover(&self.tiers, "delete");
        let removed = tiers.l1.remove(key).is_some() | tiers.l2.remove(key).is_some();
        if removed {
            self.stats.record_deletes(1);
        }
        removed
    }

    /// Remove every key matching a glob pattern across both tiers.
    ///
    /// Patterns are globs, not regexes: `*` matches any run of
    /// characters, everything else matches literally. Returns the number
    /// of distinct keys removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let regex = match glob_regex(pattern) {
            Ok(regex) => regex,
            Err(error) => {
                warn!(pattern, error = %error, "rejecting unusable invalidation pattern");
                return 0;
            }
        };

        let mut tiers = write_or_recover(&self.tiers, "invalidate_pattern");
        let keys: HashSet<String> = tiers
            .l1
            .keys()
            .chain(tiers.l2.keys())
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        for key in &keys {
            tiers.l1.remove(key);
            tiers.l2.remove(key);
        }

        self.stats.record_deletes(keys.len() as u64);
        debug!(pattern, removed = keys.len(), "invalidated by pattern");
        keys.len()
    }

    /// Remove every entry whose tag set intersects the given tags.
    ///
    /// Returns the number of distinct keys removed.
    pub fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
        let matches =
            |entry: &CacheEntry| entry.tags.iter().any(|tag| wanted.contains(tag.as_str()));

        let mut tiers = write_or_recover(&self.tiers, "invalidate_by_tags");
        let keys: HashSet<String> = tiers
            .l1
            .iter()
            .filter(|(_, entry)| matches(entry))
            .map(|(key, _)| key.clone())
            .chain(
                tiers
                    .l2
                    .iter()
                    .filter(|(_, entry)| matches(entry))
                    .map(|(key, _)| key.clone()),
            )
            .collect();
        for key in &keys {
            tiers.l1.remove(key);
            tiers.l2.remove(key);
        }

        self.stats.record_deletes(keys.len() as u64);
        debug!(?tags, removed = keys.len(), "invalidated by tags");
        keys.len()
    }

    /// Empty both tiers, folding the number of distinct outstanding keys
    /// into the `deletes` counter. A promotion shadow counts once, as in
    /// the `invalidate_*` operations. Lookup and mutation counters keep
    /// their lifetime values.
    pub fn clear(&self) {
        let mut tiers = write_or_recover(&self.tiers, "clear");
        let outstanding = tiers
            .l1
            .keys()
            .chain(tiers.l2.keys())
            .collect::<HashSet<_>>()
            .len();
        tiers.l1.clear();
        tiers.l2.clear();
        self.stats.record_deletes(outstanding as u64);
        info!(outstanding, "cache cleared");
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Snapshot tier occupancy and lifetime counters.
    pub fn stats(&self) -> StatsReport {
        let now = OffsetDateTime::now_utc();
        let tiers = read_or_recover(&self.tiers, "stats");

        let l1 = tier_report(&tiers.l1, now);
        let l2 = tier_report(&tiers.l2, now);
        let estimated_bytes = tiers
            .l1
            .values()
            .chain(tiers.l2.values())
            .map(CacheEntry::payload_len)
            .sum();

        StatsReport {
            total_entries: l1.size + l2.size,
            l1,
            l2,
            estimated_bytes,
            performance: self.stats.snapshot(),
        }
    }

    /// List entries for the admin dashboard: optional key-substring
    /// filter, key-sorted, paginated. A promotion shadow in L2 is listed
    /// once, under its L1 tier.
    pub fn entries(&self, filter: Option<&str>, offset: usize, limit: usize) -> EntryPage {
        let tiers = read_or_recover(&self.tiers, "entries");

        let mut infos: Vec<EntryInfo> = tiers
            .l1
            .iter()
            .map(|(key, entry)| entry_info(key, entry))
            .chain(
                tiers
                    .l2
                    .iter()
                    .filter(|(key, _)| !tiers.l1.contains_key(*key))
                    .map(|(key, entry)| entry_info(key, entry)),
            )
            .filter(|info| filter.is_none_or(|needle| info.key.contains(needle)))
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));

        let total = infos.len();
        let entries = infos.into_iter().skip(offset).take(limit).collect();
        EntryPage {
            entries,
            total,
            offset,
            limit,
        }
    }
}

/// Per-entry metadata exposed to the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub level: CacheLevel,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub last_accessed: OffsetDateTime,
    pub access_count: u64,
    pub compressed: bool,
    pub tags: Vec<String>,
}

/// One page of an entry listing.
#[derive(Debug, Clone, Serialize)]
pub struct EntryPage {
    pub entries: Vec<EntryInfo>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

fn entry_info(key: &str, entry: &CacheEntry) -> EntryInfo {
    let mut tags: Vec<String> = entry.tags.iter().cloned().collect();
    tags.sort_unstable();
    EntryInfo {
        key: key.to_string(),
        level: entry.level,
        expires_at: entry.expires_at,
        created_at: entry.created_at,
        last_accessed: entry.last_accessed,
        access_count: entry.access_count,
        compressed: entry.is_compressed(),
        tags,
    }
}

fn tier_report(tier: &HashMap<String, CacheEntry>, now: OffsetDateTime) -> TierReport {
    let expired = tier.values().filter(|entry| entry.is_expired(now)).count();
    TierReport {
        size: tier.len(),
        expired,
        active: tier.len() - expired,
    }
}

/// Convert a glob pattern to an anchored regex, escaping everything
/// except `*`.
fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    Regex::new(&format!("^{escaped}$"))
}
