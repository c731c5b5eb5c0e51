use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire a mutex, recovering the guard if a panicking holder poisoned it.
/// Cached state is re-fetchable; the store must stay usable.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                result = "poisoned_recovered",
                hint = "cache state may be stale after panic in another task",
                "Recovered from poisoned query cache lock"
            );
            poisoned.into_inner()
        }
    }
}
