use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a tier mutex, recovering the guard if a previous holder panicked.
///
/// A cache tier only holds disposable copies of produced values, so stale
/// state after a panic is acceptable where a second panic is not.
pub(crate) fn lock_tier<'a, T>(
    lock: &'a Mutex<T>,
    tier: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            tier,
            op,
            result = "poisoned_recovered",
            "Recovered from poisoned cache tier lock"
        );
        poisoned.into_inner()
    })
}
