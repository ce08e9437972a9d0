//! Mutex helper shared by the cache structures.

use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves the map consistent between
/// statements, so a poisoned lock still guards usable state.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(op, "Recovered from poisoned cache lock");
            poisoned.into_inner()
        }
    }
}
