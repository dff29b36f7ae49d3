//! Cross-core shared state: the `parking_lot`-guarded realization of the
//! "mutex primitive for motion/state cross-core access" in §2/§5.
//!
//! Grounded on the same short-timeout-then-log discipline the teacher's
//! `evo_shared_memory` layer applies around its own `parking_lot::Mutex`
//! guarded segments.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

/// How long the motion core will wait to acquire a shared-state lock before
/// giving up and logging a resource-conflict warning.
pub const LOCK_TIMEOUT: Duration = Duration::from_micros(200);

/// A value shared between the motion core and the service core, guarded by
/// a short-timeout mutex. Acquisition never blocks indefinitely: on timeout
/// the caller gets `None` and is expected to skip this tick's update rather
/// than stall the real-time loop.
pub struct Shared<T> {
    inner: Mutex<T>,
    label: &'static str,
}

impl<T> Shared<T> {
    /// Wrap `value`, labeling it for the warning log on contention.
    pub fn new(value: T, label: &'static str) -> Self {
        Self {
            inner: Mutex::new(value),
            label,
        }
    }

    /// Try to acquire the lock within [`LOCK_TIMEOUT`] and run `f` with a
    /// mutable reference to the guarded value. Logs and returns `None` on
    /// timeout rather than blocking.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.inner.try_lock_for(LOCK_TIMEOUT) {
            Some(mut guard) => Some(f(&mut guard)),
            None => {
                warn!(label = self.label, "shared state lock timed out, skipping update");
                None
            }
        }
    }

    /// Try to acquire the lock within [`LOCK_TIMEOUT`] and run `f` with a
    /// shared reference, for reads (e.g. telemetry snapshots).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match self.inner.try_lock_for(LOCK_TIMEOUT) {
            Some(guard) => Some(f(&guard)),
            None => {
                warn!(label = self.label, "shared state lock timed out, skipping read");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_mut_runs_closure_and_returns_result() {
        let shared = Shared::new(0u32, "counter");
        let r = shared.with_mut(|v| {
            *v += 1;
            *v
        });
        assert_eq!(r, Some(1));
    }

    #[test]
    fn with_reads_current_value() {
        let shared = Shared::new(42i64, "value");
        assert_eq!(shared.with(|v| *v), Some(42));
    }

    #[test]
    fn contended_lock_skips_update_without_blocking() {
        let shared = Shared::new(0u32, "counter");
        let guard = shared.inner.lock();
        let r = shared.with_mut(|v| *v += 1);
        assert_eq!(r, None);
        drop(guard);
        assert_eq!(shared.with_mut(|v| *v += 1), Some(1));
    }
}
