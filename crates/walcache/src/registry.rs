//! Concurrent mapping from locker keys to per-key mutex slots.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use walcache_core::LockerKey;

/// A locker: the per-key mutex together with its cached value slot.
///
/// The slot starts empty and is filled by the loader on first access under
/// the mutex.
pub type Slot<V> = Arc<Mutex<Option<V>>>;

/// Registry of lockers, one per key ever referenced.
///
/// Lockers are created lazily and never removed for the lifetime of the
/// process; callers racing `ensure` for the same key all receive the same
/// instance.
pub struct LockerRegistry<V> {
    lockers: DashMap<LockerKey, Slot<V>>,
}

impl<V> LockerRegistry<V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { lockers: DashMap::new() }
    }

    /// Returns the locker for `key`, creating it if this is the first
    /// reference.
    pub fn ensure(&self, key: &LockerKey) -> Slot<V> {
        if let Some(slot) = self.lockers.get(key) {
            return Arc::clone(slot.value());
        }
        let entry = self.lockers.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "locker created");
            Arc::new(Mutex::new(None))
        });
        Arc::clone(entry.value())
    }

    /// Best-effort snapshot of all known keys; ordering is unspecified.
    #[must_use]
    pub fn keys(&self) -> Vec<LockerKey> {
        self.lockers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of lockers ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lockers.len()
    }

    /// Returns `true` if no key has been referenced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lockers.is_empty()
    }
}

impl<V> Default for LockerRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_returns_same_slot() {
        let registry: LockerRegistry<u64> = LockerRegistry::new();
        let key = LockerKey::from("acct:A");

        let first = registry.ensure(&key);
        let second = registry.ensure(&key);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_ensure_single_locker() {
        let registry: Arc<LockerRegistry<u64>> = Arc::new(LockerRegistry::new());
        let key = LockerKey::from("acct:B");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            handles.push(tokio::spawn(async move { registry.ensure(&key) }));
        }

        let mut slots = Vec::new();
        for handle in handles {
            slots.push(handle.await.unwrap());
        }
        for slot in &slots[1..] {
            assert!(Arc::ptr_eq(&slots[0], slot));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_keys_snapshot() {
        let registry: LockerRegistry<u64> = LockerRegistry::new();
        registry.ensure(&LockerKey::from("a"));
        registry.ensure(&LockerKey::from("b"));

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec![LockerKey::from("a"), LockerKey::from("b")]);
    }
}
