//! Lock acquisition for shared cache state.
//!
//! The tier maps, the warm queue and the sweeper handle all sit behind
//! standard-library locks. Poisoned guards are recovered: a panicked
//! request task leaves its last consistent write behind, and the cache
//! keeps serving rather than wedging every other task.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Read the tiers (or any other shared state), recovering from poison.
pub(crate) fn read_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            op,
            kind = "rwlock.read",
            "recovered poisoned cache lock, entries may be stale"
        );
        poisoned.into_inner()
    })
}

/// Write-lock the tiers, recovering from poison.
pub(crate) fn write_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            op,
            kind = "rwlock.write",
            "recovered poisoned cache lock, entries may be stale"
        );
        poisoned.into_inner()
    })
}

/// Lock the warm-queue or sweeper state, recovering from poison.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            kind = "mutex",
            "recovered poisoned cache lock, entries may be stale"
        );
        poisoned.into_inner()
    })
}
