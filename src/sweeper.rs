//! Expiry sweeper.
//!
//! A recurring background pass that purges entries past their TTL from
//! both tiers. The task is owned by the cache instance, started and
//! stopped independently of construction, and aborted on drop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::lock::{lock_or_recover, write_or_recover};
use crate::store::{L1_PRESSURE_DEN, L1_PRESSURE_NUM, ResponseCache};

pub(crate) const METRIC_EXPIRED_SWEPT_TOTAL: &str = "panelcache_expired_swept_total";
pub(crate) const METRIC_SWEEP_MS: &str = "panelcache_sweep_ms";

#[derive(Debug, Default)]
pub(crate) struct SweeperHandle {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SweeperHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        // Abort even when a panicked holder poisoned the lock.
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

impl ResponseCache {
    /// Run one sweep pass: remove expired entries from both tiers, then
    /// relieve L1 pressure if occupancy still exceeds 90%.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let started_at = Instant::now();
        let now = OffsetDateTime::now_utc();
        let mut tiers = write_or_recover(&self.tiers, "sweep_expired");

        // Collect first, then delete: never mutate a tier while
        // iterating it.
        let l1_expired: Vec<String> = tiers
            .l1
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        let l2_expired: Vec<String> = tiers
            .l2
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &l1_expired {
            tiers.l1.remove(key);
        }
        for key in &l2_expired {
            tiers.l2.remove(key);
        }
        let removed = l1_expired.len() + l2_expired.len();

        if tiers.l1.len() * L1_PRESSURE_DEN > self.config().max_entries() * L1_PRESSURE_NUM {
            self.evict_locked(&mut tiers);
        }
        drop(tiers);

        if removed > 0 {
            counter!(METRIC_EXPIRED_SWEPT_TOTAL).increment(removed as u64);
            debug!(removed, "sweep removed expired entries");
        }
        histogram!(METRIC_SWEEP_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        removed
    }

    /// Start the recurring sweeper task. A no-op when already running.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut task = lock_or_recover(&self.sweeper.task, "start_sweeper");
        if task.is_some() {
            debug!("sweeper already running");
            return;
        }

        let cache = Arc::clone(self);
        let interval_duration = self.config().cleanup_interval();
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                cache.sweep_expired();
            }
        }));

        info!(
            interval_secs = interval_duration.as_secs(),
            "expiry sweeper started"
        );
    }

    /// Stop the sweeper task. Idempotent; safe to call before `start`.
    pub fn stop_sweeper(&self) {
        let handle = lock_or_recover(&self.sweeper.task, "stop_sweeper").take();
        if let Some(handle) = handle {
            handle.abort();
            info!("expiry sweeper stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::thread::sleep;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::CacheConfig;
    use crate::store::SetOptions;

    use super::*;

    #[test]
    fn sweep_removes_expired_from_both_tiers() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set("/live", json!(1), None, SetOptions::default());
        cache.set(
            "/dead-l1",
            json!(2),
            Some(Duration::ZERO),
            SetOptions::default(),
        );
        cache.set(
            "/dead-l2",
            json!(3),
            Some(Duration::ZERO),
            SetOptions {
                level: Some(crate::entry::CacheLevel::L2),
                ..Default::default()
            },
        );
        sleep(Duration::from_millis(5));

        assert_eq!(cache.sweep_expired(), 2);

        let report = cache.stats();
        assert_eq!(report.l1.size, 1);
        assert_eq!(report.l2.size, 0);
        assert_eq!(cache.get("/live"), Some(json!(1)));
    }

    #[test]
    fn sweep_relieves_l1_pressure() {
        let cache = ResponseCache::new(CacheConfig {
            max_size: 10,
            ..Default::default()
        });
        // 10/10 occupancy stays above the 90% pressure point even with
        // nothing expired, so the sweep demotes one entry.
        for i in 0..8 {
            cache.set(&format!("/k{i}"), json!(i), None, SetOptions::default());
        }
        {
            let mut tiers = cache.tiers.write().expect("fresh lock");
            let extras: Vec<_> = (8..10)
                .map(|i| {
                    let entry = tiers.l1.get("/k0").expect("seeded").clone();
                    (format!("/k{i}"), entry)
                })
                .collect();
            for (key, entry) in extras {
                tiers.l1.insert(key, entry);
            }
        }

        assert_eq!(cache.sweep_expired(), 0);

        let report = cache.stats();
        assert_eq!(report.l1.size, 9);
        assert_eq!(report.l2.size, 1);
    }

    #[tokio::test]
    async fn sweeper_lifecycle_is_idempotent() {
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));

        cache.stop_sweeper(); // Stop before start is a no-op

        cache.start_sweeper();
        cache.start_sweeper(); // Second start is a no-op

        cache.stop_sweeper();
        cache.stop_sweeper();
    }

    #[tokio::test]
    async fn sweeper_task_purges_on_interval() {
        let cache = Arc::new(ResponseCache::new(CacheConfig {
            cleanup_interval_secs: 1,
            ..Default::default()
        }));
        cache.set(
            "/dead",
            json!(1),
            Some(Duration::ZERO),
            SetOptions::default(),
        );

        cache.start_sweeper();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        cache.stop_sweeper();

        assert_eq!(cache.stats().l1.size, 0);
    }

    #[tokio::test]
    async fn sweeper_handle_drop_survives_poisoned_lock() {
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        cache.start_sweeper();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.sweeper.task.lock().expect("lock acquires");
            panic!("poison the task lock");
        }));

        // Stop takes the handle through the recovered guard; the later
        // handle drop must not skip the abort either.
        cache.stop_sweeper();
        assert!(
            cache
                .sweeper
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_none()
        );
    }
}
