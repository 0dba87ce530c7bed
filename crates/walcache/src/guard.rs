//! RAII guard over a locked value slot.

use std::time::Instant;

use metrics::histogram;
use tokio::sync::OwnedMutexGuard;

use crate::metrics::LOCK_HOLD_SECONDS;

/// Exclusive access to a loaded value, released on drop.
///
/// Dropping the guard unlocks the per-key mutex on every path, including
/// unwinding, and records the lock-hold histogram for the operation that
/// acquired it.
pub(crate) struct ValueGuard<V> {
    guard: OwnedMutexGuard<Option<V>>,
    acquired: Instant,
    op: &'static str,
}

impl<V> ValueGuard<V> {
    /// Wraps a guard whose slot has already been initialized.
    pub(crate) fn new(guard: OwnedMutexGuard<Option<V>>, op: &'static str) -> Self {
        Self { guard, acquired: Instant::now(), op }
    }

    pub(crate) fn value(&self) -> &V {
        self.guard.as_ref().expect("slot initialized before guard handout")
    }

    pub(crate) fn value_mut(&mut self) -> &mut V {
        self.guard.as_mut().expect("slot initialized before guard handout")
    }
}

impl<V> Drop for ValueGuard<V> {
    fn drop(&mut self) {
        histogram!(LOCK_HOLD_SECONDS, "op" => self.op)
            .record(self.acquired.elapsed().as_secs_f64());
    }
}
