//! Key-value store contract consumed by the KV-flavored cache engine.
//!
//! The store is assumed to have no transactions; the only atomicity primitive
//! is [`KvStore::write`], which applies a whole [`WriteBatch`] or none of it.
//! The engine leans on that: a TCC barrier claim and its WAL record are always
//! staged into one batch so they become durable together.

use async_trait::async_trait;
use walcache_core::Result;

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store `value` under `key` in the record space (WAL entries, barrier
    /// claims, value snapshots).
    Put {
        /// Record key.
        key: Vec<u8>,
        /// Record value; may be empty (barrier claims for Must/Confirm/Cancel).
        value: Vec<u8>,
    },
    /// Set the persisted dirty marker for a locker key.
    SetDirty {
        /// The locker key.
        key: Vec<u8>,
    },
    /// Clear the persisted dirty marker for a locker key.
    ClearDirty {
        /// The locker key.
        key: Vec<u8>,
    },
}

/// An ordered batch of operations applied atomically by [`KvStore::write`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put of `value` under `key`.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put { key: key.into(), value: value.into() });
    }

    /// Stages setting the dirty marker for a locker key.
    pub fn set_dirty(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::SetDirty { key: key.into() });
    }

    /// Stages clearing the dirty marker for a locker key.
    pub fn clear_dirty(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::ClearDirty { key: key.into() });
    }

    /// Returns `true` if no operations are staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Staged operations, in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch, yielding its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Contract for the embedded key-value store backing the KV cache flavor.
///
/// Implementations keep two spaces: the record space (WAL entries, barrier
/// claims) addressed by `get`/`put`/`delete`, and the dirty-marker space
/// addressed by `mark_dirty`/`list_dirty`. A [`WriteBatch`] may span both and
/// MUST be applied atomically.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Reads a record, returning `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the read cannot be performed.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be performed.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deletes a single record. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete cannot be performed.
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Applies a batch atomically: either every operation becomes durable or
    /// none does.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be applied; in that case no
    /// operation of the batch is visible.
    async fn write(&self, batch: WriteBatch) -> Result<()>;

    /// Sets or clears the persisted dirty marker for a locker key.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be updated.
    async fn mark_dirty(&self, key: &[u8], dirty: bool) -> Result<()>;

    /// Lists all locker keys with a persisted dirty marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be performed.
    async fn list_dirty(&self) -> Result<Vec<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ordering() {
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.set_dirty(b"k".to_vec());
        batch.clear_dirty(b"k".to_vec());

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.ops()[0], BatchOp::Put { .. }));
        assert!(matches!(batch.ops()[1], BatchOp::SetDirty { .. }));
        assert!(matches!(batch.ops()[2], BatchOp::ClearDirty { .. }));
    }

    #[test]
    fn test_empty_batch() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
