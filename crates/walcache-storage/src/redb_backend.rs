//! redb-based key-value store with persisted dirty markers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, Durability, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;
use walcache_core::{config::RedbConfig, Error, Result};

use crate::kv::{BatchOp, KvStore, WriteBatch};

// === Table Definitions ===

/// Record space: WAL entries, barrier claims and value snapshots.
const RECORDS: TableDefinition<'_, &[u8], &[u8]> = TableDefinition::new("records");

/// Dirty markers: locker key -> empty. Presence means the in-memory value had
/// unflushed WAL when the marker was last written.
const DIRTY: TableDefinition<'_, &[u8], &[u8]> = TableDefinition::new("dirty");

/// Convert any error with Display to our Error type.
fn db_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

/// redb-backed [`KvStore`].
///
/// All calls go through `spawn_blocking`; a [`WriteBatch`] is applied inside
/// one redb write transaction, which is the atomicity guarantee the engine
/// relies on for barrier-plus-WAL writes.
pub struct RedbKvStore {
    db: Arc<Database>,
    durability: Durability,
}

impl RedbKvStore {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path, config: &RedbConfig) -> Result<Self> {
        debug!(?path, "Opening redb kv store");

        // Note: cache_size_bytes is advisory; redb manages its cache
        // internally and exposes no sizing knob on this path.
        let db = Database::create(path).map_err(db_err)?;
        Self::init_tables(&db)?;

        let durability =
            if config.durable_writes { Durability::Immediate } else { Durability::None };

        Ok(Self { db: Arc::new(db), durability })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err)?;
        Self::init_tables(&db)?;

        Ok(Self { db: Arc::new(db), durability: Durability::None })
    }

    /// Initialize tables by opening them in a write transaction.
    /// This ensures tables exist before any read operations.
    fn init_tables(db: &Database) -> Result<()> {
        let txn = db.begin_write().map_err(db_err)?;
        let _ = txn.open_table(RECORDS).map_err(db_err)?;
        let _ = txn.open_table(DIRTY).map_err(db_err)?;
        txn.commit().map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for RedbKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = key.to_vec();
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(db_err)?;
            let table = txn.open_table(RECORDS).map_err(db_err)?;
            let value = table.get(key.as_slice()).map_err(db_err)?;
            Ok(value.map(|guard| guard.value().to_vec()))
        })
        .await
        .map_err(db_err)?
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = key.to_vec();
        let value = value.to_vec();
        let db = Arc::clone(&self.db);
        let durability = self.durability;

        tokio::task::spawn_blocking(move || {
            let mut txn = db.begin_write().map_err(db_err)?;
            txn.set_durability(durability).map_err(db_err)?;
            {
                let mut table = txn.open_table(RECORDS).map_err(db_err)?;
                table.insert(key.as_slice(), value.as_slice()).map_err(db_err)?;
            }
            txn.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(db_err)?
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        let key = key.to_vec();
        let db = Arc::clone(&self.db);
        let durability = self.durability;

        tokio::task::spawn_blocking(move || {
            let mut txn = db.begin_write().map_err(db_err)?;
            txn.set_durability(durability).map_err(db_err)?;
            {
                let mut table = txn.open_table(RECORDS).map_err(db_err)?;
                table.remove(key.as_slice()).map_err(db_err)?;
            }
            txn.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(db_err)?
    }

    async fn write(&self, batch: WriteBatch) -> Result<()> {
        let db = Arc::clone(&self.db);
        let durability = self.durability;
        let ops = batch.into_ops();

        tokio::task::spawn_blocking(move || {
            let mut txn = db.begin_write().map_err(db_err)?;
            txn.set_durability(durability).map_err(db_err)?;
            {
                let mut records = txn.open_table(RECORDS).map_err(db_err)?;
                let mut dirty = txn.open_table(DIRTY).map_err(db_err)?;
                for op in ops {
                    match op {
                        BatchOp::Put { key, value } => {
                            records.insert(key.as_slice(), value.as_slice()).map_err(db_err)?;
                        }
                        BatchOp::SetDirty { key } => {
                            let marker: &[u8] = &[];
                            dirty.insert(key.as_slice(), marker).map_err(db_err)?;
                        }
                        BatchOp::ClearDirty { key } => {
                            dirty.remove(key.as_slice()).map_err(db_err)?;
                        }
                    }
                }
            }
            txn.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(db_err)?
    }

    async fn mark_dirty(&self, key: &[u8], dirty: bool) -> Result<()> {
        let key = key.to_vec();
        let db = Arc::clone(&self.db);
        let durability = self.durability;

        tokio::task::spawn_blocking(move || {
            let mut txn = db.begin_write().map_err(db_err)?;
            txn.set_durability(durability).map_err(db_err)?;
            {
                let mut table = txn.open_table(DIRTY).map_err(db_err)?;
                if dirty {
                    let marker: &[u8] = &[];
                    table.insert(key.as_slice(), marker).map_err(db_err)?;
                } else {
                    table.remove(key.as_slice()).map_err(db_err)?;
                }
            }
            txn.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(db_err)?
    }

    async fn list_dirty(&self) -> Result<Vec<Vec<u8>>> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(db_err)?;
            let table = txn.open_table(DIRTY).map_err(db_err)?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(db_err)? {
                let (key, _) = entry.map_err(db_err)?;
                keys.push(key.value().to_vec());
            }
            Ok(keys)
        })
        .await
        .map_err(db_err)?
    }
}
