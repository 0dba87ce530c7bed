//! In-memory key-value store for tests and examples.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use walcache_core::Result;

use crate::kv::{BatchOp, KvStore, WriteBatch};

/// Heap-backed [`KvStore`] with no durability.
///
/// A [`WriteBatch`] is applied under one lock acquisition, which gives the
/// same all-or-nothing visibility the engine expects from a real store.
#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<Vec<u8>, Vec<u8>>,
    dirty: BTreeSet<Vec<u8>>,
}

impl MemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Returns `true` if no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock().await;
        Ok(inner.records.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.records.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.records.remove(key);
        Ok(())
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    inner.records.insert(key, value);
                }
                BatchOp::SetDirty { key } => {
                    inner.dirty.insert(key);
                }
                BatchOp::ClearDirty { key } => {
                    inner.dirty.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn mark_dirty(&self, key: &[u8], dirty: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if dirty {
            inner.dirty.insert(key.to_vec());
        } else {
            inner.dirty.remove(key);
        }
        Ok(())
    }

    async fn list_dirty(&self) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.lock().await;
        Ok(inner.dirty.iter().cloned().collect())
    }
}
