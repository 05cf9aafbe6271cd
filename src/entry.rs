//! Cache entry data model.

use std::collections::HashSet;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::codec;

/// Tier currently holding an entry. Diagnostic; lookups always probe L1
/// before L2 regardless of this marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    L1,
    L2,
}

impl CacheLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLevel::L1 => "l1",
            CacheLevel::L2 => "l2",
        }
    }
}

/// Stored payload, either the raw JSON value or its gzipped serialization.
#[derive(Debug, Clone)]
pub(crate) enum StoredPayload {
    Plain(Value),
    Compressed(Bytes),
}

/// A single cached response payload with its bookkeeping.
///
/// Owned exclusively by the tier map that holds it; promotion and
/// demotion clone or move the entry, never share it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) payload: StoredPayload,
    /// Set once at insertion; never extended by access.
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    /// Updated only by a successful `get`.
    pub last_accessed: OffsetDateTime,
    /// Incremented only by a successful `get`.
    pub access_count: u64,
    /// Write-once labels for bulk invalidation.
    pub tags: HashSet<String>,
    pub level: CacheLevel,
}

impl CacheEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.payload, StoredPayload::Compressed(_))
    }

    /// Serialized payload size in bytes; failures count as zero.
    pub(crate) fn payload_len(&self) -> usize {
        match &self.payload {
            StoredPayload::Plain(value) => codec::serialized_len(value),
            StoredPayload::Compressed(bytes) => bytes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn sample_entry(now: OffsetDateTime, ttl: Duration) -> CacheEntry {
        CacheEntry {
            payload: StoredPayload::Plain(json!({"series": "test"})),
            expires_at: now + ttl,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            tags: HashSet::new(),
            level: CacheLevel::L1,
        }
    }

    #[test]
    fn expiry_is_strict() {
        let now = OffsetDateTime::now_utc();
        let entry = sample_entry(now, Duration::from_secs(60));

        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + Duration::from_secs(60)));
        assert!(entry.is_expired(now + Duration::from_secs(61)));
    }

    #[test]
    fn plain_payload_len_is_serialized_size() {
        let now = OffsetDateTime::now_utc();
        let entry = sample_entry(now, Duration::from_secs(60));

        let expected = serde_json::to_vec(&json!({"series": "test"}))
            .expect("serializable")
            .len();
        assert_eq!(entry.payload_len(), expected);
        assert!(!entry.is_compressed());
    }

    #[test]
    fn level_labels() {
        assert_eq!(CacheLevel::L1.as_str(), "l1");
        assert_eq!(CacheLevel::L2.as_str(), "l2");
    }
}
