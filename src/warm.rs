//! Warm queue.
//!
//! Serializes bulk pre-population: exactly one warm pass drives the
//! queue at a time. Submissions made while a pass is active are appended
//! to a pending queue and applied by the driver, in arrival order,
//! before the pass goes inactive.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::histogram;
use serde_json::Value;
use tracing::{debug, info};

use crate::lock::lock_or_recover;
use crate::store::{ResponseCache, SetOptions};

pub(crate) const METRIC_WARM_MS: &str = "panelcache_warm_ms";

/// One entry of a warm batch, applied via `set` in submission order.
#[derive(Debug, Clone)]
pub struct WarmItem {
    pub key: String,
    pub value: Value,
    pub ttl: Option<Duration>,
    pub options: SetOptions,
}

impl WarmItem {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: None,
            options: SetOptions::default(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct WarmQueue {
    inner: Mutex<WarmInner>,
}

#[derive(Debug, Default)]
struct WarmInner {
    driving: bool,
    pending: VecDeque<WarmItem>,
}

impl WarmQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the driving role, or enqueue the items behind the active
    /// pass. Returns the items to apply when this caller becomes the
    /// driver.
    fn begin_or_enqueue(&self, items: Vec<WarmItem>) -> Option<Vec<WarmItem>> {
        let mut inner = lock_or_recover(&self.inner, "begin_or_enqueue");
        if inner.driving {
            inner.pending.extend(items);
            return None;
        }
        inner.driving = true;
        Some(items)
    }

    /// Drain items enqueued during the current pass, or release the
    /// driving role when nothing is pending. The empty-check and the
    /// release happen under one lock so no submission can slip between
    /// them.
    fn next_batch(&self) -> Option<Vec<WarmItem>> {
        let mut inner = lock_or_recover(&self.inner, "next_batch");
        if inner.pending.is_empty() {
            inner.driving = false;
            return None;
        }
        Some(inner.pending.drain(..).collect())
    }
}

impl ResponseCache {
    /// Pre-populate the cache with an ordered batch.
    ///
    /// If a warm pass is already active the items are queued behind it
    /// and this call returns immediately; the active driver applies them
    /// in arrival order before finishing.
    pub fn warm_cache(&self, items: Vec<WarmItem>) {
        let submitted = items.len();
        let Some(mut batch) = self.warm.begin_or_enqueue(items) else {
            debug!(items = submitted, "warm pass active, items queued");
            return;
        };

        let started_at = Instant::now();
        let mut applied = 0usize;
        loop {
            for item in batch {
                self.set(&item.key, item.value, item.ttl, item.options);
                applied += 1;
            }
            match self.warm.next_batch() {
                Some(next) => batch = next,
                None => break,
            }
        }

        histogram!(METRIC_WARM_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(applied, "cache warm pass complete");
    }
}
