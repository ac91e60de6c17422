use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn report_poisoned(source: &'static str, op: &'static str, mode: &'static str) {
    warn!(
        op,
        source_module = source,
        lock_mode = mode,
        outcome = "poison_cleared",
        "Finder cache lock was poisoned by a panicking thread; continuing with inner state"
    );
}

pub(crate) fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(source, op, "read");
        poisoned.into_inner()
    })
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(source, op, "write");
        poisoned.into_inner()
    })
}
