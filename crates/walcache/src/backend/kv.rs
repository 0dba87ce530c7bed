//! KV-flavored back end: barrier claims and WAL records in one atomic batch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use walcache_core::{
    config::BarrierConfig, BranchType, Error, LockerKey, Result, TccContext, WalRecord,
    ERR_RESERVATION_NOT_FOUND,
};
use walcache_storage::{KvStore, WriteBatch};

use crate::backend::{Backend, BranchResult};
use crate::barrier::KvBarrier;
use crate::provider::{KvBusinessProvider, Reservation, WalDecision};
use crate::value::LockerValue;

/// The KV back end's "transaction": a pending batch, written as one atom on
/// commit and simply dropped on rollback.
pub struct KvAtom {
    batch: WriteBatch,
}

/// Back end persisting barriers and WAL on an embedded key-value store.
///
/// The store has no transactions; atomicity between the barrier claim, the
/// WAL record and the dirty marker comes from staging all of them into one
/// [`WriteBatch`]. The Try barrier claim stores the Try WAL key, which is how
/// Confirm/Cancel later find their reservation.
pub struct KvBackend<P: KvBusinessProvider> {
    store: Arc<dyn KvStore>,
    provider: Arc<P>,
    barrier: KvBarrier,
}

impl<P: KvBusinessProvider> KvBackend<P> {
    /// Creates a back end over a store, a business provider and barrier
    /// configuration.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, provider: Arc<P>, config: &BarrierConfig) -> Self {
        Self { store, provider, barrier: KvBarrier::new(config) }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The business provider backing this back end.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Resolves the Try reservation of `ctx`: the Try barrier claim maps to
    /// the Try WAL key, which maps to the WAL payload.
    async fn load_reservation(&self, ctx: &TccContext) -> Result<Reservation<WalRecord>> {
        let try_key = self.barrier.key(ctx, BranchType::Try);
        let Some(wal_key) = self.store.get(try_key.as_bytes()).await? else {
            return Ok(Reservation::Missing {
                code: ERR_RESERVATION_NOT_FOUND.to_string(),
                message: format!("reservation not found from barrier: {try_key}"),
            });
        };

        let Some(payload) = self.store.get(&wal_key).await? else {
            return Ok(Reservation::Missing {
                code: ERR_RESERVATION_NOT_FOUND.to_string(),
                message: format!(
                    "reservation not found from wal: {}",
                    String::from_utf8_lossy(&wal_key)
                ),
            });
        };

        let key = String::from_utf8(wal_key)
            .map_err(|_| Error::Storage("non-utf8 wal key behind try barrier".to_string()))?;
        Ok(Reservation::Found(WalRecord::new(key, payload)))
    }

    /// Stages the barrier claim, the WAL record and (for a previously clean
    /// value) the dirty marker into the pending batch.
    fn stage(
        &self,
        atom: &mut KvAtom,
        ctx: &TccContext,
        branch: BranchType,
        key: &LockerKey,
        value: &P::Value,
        wal: &WalRecord,
    ) {
        // the Try claim carries the WAL key so Confirm/Cancel can find the
        // reservation; other claims are bare markers
        let claim_value = match branch {
            BranchType::Try => wal.key.as_bytes().to_vec(),
            _ => Vec::new(),
        };
        atom.batch.put(self.barrier.key(ctx, branch).as_bytes().to_vec(), claim_value);
        atom.batch.put(wal.key.as_bytes().to_vec(), wal.payload.to_vec());
        if !value.is_dirty() {
            atom.batch.set_dirty(key.as_bytes().to_vec());
        }
    }
}

#[async_trait]
impl<P: KvBusinessProvider> Backend for KvBackend<P> {
    type Value = P::Value;
    type Body = P::Body;
    type Wal = WalRecord;
    type Txn = KvAtom;

    async fn initialize(&self, key: &LockerKey) -> Result<Self::Value> {
        let mut value = match self.provider.load_value(key).await? {
            Some(value) => value,
            None => match self.provider.materialize(key) {
                Some(value) => {
                    debug!(key = %key, "materialized fresh value");
                    value
                }
                None => return Err(Error::ValueNotFound(key.clone())),
            },
        };

        let applied = self.provider.catchup_wals(self.store.as_ref(), key, &mut value).await?;
        if applied {
            // write the replayed state through so the WAL is truncatable
            self.provider.persist_value(key, &value).await?;
            value.set_db_version(value.version());
        }
        value.set_dirty(false);
        self.store.mark_dirty(key.as_bytes(), false).await?;

        Ok(value)
    }

    async fn persist(&self, key: &LockerKey, value: &Self::Value) -> Result<()> {
        self.provider.persist_value(key, value).await
    }

    async fn clear_dirty_marker(&self, key: &LockerKey) -> Result<()> {
        self.store.mark_dirty(key.as_bytes(), false).await
    }

    async fn list_dirty_keys(&self) -> Result<Vec<LockerKey>> {
        let raw = self.store.list_dirty().await?;
        raw.into_iter()
            .map(|key| {
                String::from_utf8(key)
                    .map(LockerKey::from)
                    .map_err(|_| Error::Storage("non-utf8 dirty marker key".to_string()))
            })
            .collect()
    }

    async fn begin(&self) -> Result<Self::Txn> {
        Ok(KvAtom { batch: WriteBatch::new() })
    }

    async fn commit(&self, txn: Self::Txn) -> Result<()> {
        if txn.batch.is_empty() {
            return Ok(());
        }
        self.store.write(txn.batch).await
    }

    async fn rollback(&self, _txn: Self::Txn) -> Result<()> {
        // nothing was written; dropping the batch is the rollback
        Ok(())
    }

    async fn barrier(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        branch: BranchType,
    ) -> Result<bool> {
        self.barrier.check(self.store.as_ref(), &mut txn.batch, ctx, branch).await
    }

    async fn do_must(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<BranchResult<Self::Wal>> {
        debug!(tcc = %ctx, "do_must");
        match self.provider.generate_wal_must(ctx, key, value, body)? {
            WalDecision::Veto { code, message } => Ok(BranchResult::Veto { code, message }),
            WalDecision::Wal(wal) => {
                self.stage(txn, ctx, BranchType::Must, key, value, &wal);
                Ok(BranchResult::Stage(wal))
            }
        }
    }

    async fn do_try(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<BranchResult<Self::Wal>> {
        debug!(tcc = %ctx, "do_try");
        match self.provider.generate_wal_try(ctx, key, value, body)? {
            WalDecision::Veto { code, message } => Ok(BranchResult::Veto { code, message }),
            WalDecision::Wal(wal) => {
                self.stage(txn, ctx, BranchType::Try, key, value, &wal);
                Ok(BranchResult::Stage(wal))
            }
        }
    }

    async fn do_confirm(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
    ) -> Result<BranchResult<Self::Wal>> {
        debug!(tcc = %ctx, "do_confirm");
        let reservation = match self.load_reservation(ctx).await? {
            Reservation::Found(wal) => wal,
            Reservation::Missing { code, message } => {
                return Ok(BranchResult::Veto { code, message })
            }
        };

        match self.provider.generate_wal_confirm(ctx, key, value, &reservation) {
            None => {
                // still claim the branch so a retry reports a duplicate
                txn.batch
                    .put(self.barrier.key(ctx, BranchType::Confirm).as_bytes().to_vec(), Vec::new());
                Ok(BranchResult::Noop)
            }
            Some(wal) => {
                self.stage(txn, ctx, BranchType::Confirm, key, value, &wal);
                Ok(BranchResult::Stage(wal))
            }
        }
    }

    async fn do_cancel(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
    ) -> Result<BranchResult<Self::Wal>> {
        debug!(tcc = %ctx, "do_cancel");
        let reservation = match self.load_reservation(ctx).await? {
            Reservation::Found(wal) => wal,
            Reservation::Missing { code, message } => {
                return Ok(BranchResult::Veto { code, message })
            }
        };

        match self.provider.generate_wal_cancel(ctx, key, value, &reservation) {
            None => {
                txn.batch
                    .put(self.barrier.key(ctx, BranchType::Cancel).as_bytes().to_vec(), Vec::new());
                Ok(BranchResult::Noop)
            }
            Some(wal) => {
                self.stage(txn, ctx, BranchType::Cancel, key, value, &wal);
                Ok(BranchResult::Stage(wal))
            }
        }
    }

    fn apply(&self, value: &mut Self::Value, wal: &Self::Wal) -> Result<()> {
        self.provider.apply_wal(value, std::slice::from_ref(wal))?;
        value.set_dirty(true);
        Ok(())
    }
}
