//! SQL-flavored back end: barrier rows and WAL rows share the host's
//! transaction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use walcache_core::{config::BarrierConfig, BranchType, Error, LockerKey, Result, TccContext};

use crate::backend::{Backend, BranchResult};
use crate::barrier::SqlBarrier;
use crate::provider::{Reservation, SqlBusinessProvider, SqlSession, WalDecision};
use crate::value::LockerValue;

/// Back end persisting barriers and WAL through the host's SQL database.
///
/// The surrounding transaction is the atom: barrier insert, WAL insert and
/// any business reads either all commit or all roll back.
pub struct SqlBackend<S, P>
where
    S: SqlSession,
    P: SqlBusinessProvider<Txn = S::Txn>,
{
    session: Arc<S>,
    provider: Arc<P>,
    barrier: SqlBarrier,
}

impl<S, P> SqlBackend<S, P>
where
    S: SqlSession,
    P: SqlBusinessProvider<Txn = S::Txn>,
{
    /// Creates a back end over a session, a business provider and barrier
    /// configuration.
    #[must_use]
    pub fn new(session: Arc<S>, provider: Arc<P>, config: &BarrierConfig) -> Self {
        Self { session, provider, barrier: SqlBarrier::new(config) }
    }

    /// The business provider backing this back end.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<S, P> Backend for SqlBackend<S, P>
where
    S: SqlSession,
    P: SqlBusinessProvider<Txn = S::Txn>,
{
    type Value = P::Value;
    type Body = P::Body;
    type Wal = P::Wal;
    type Txn = S::Txn;

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

        let applied = self.provider.catchup_wals(key, &mut value).await?;
        if applied {
            // write the replayed state through so the WAL is truncatable
            self.provider.persist_value(key, &value).await?;
            value.set_db_version(value.version());
        }
        value.set_dirty(false);

        Ok(value)
    }

    async fn persist(&self, key: &LockerKey, value: &Self::Value) -> Result<()> {
        self.provider.persist_value(key, value).await
    }

    async fn clear_dirty_marker(&self, _key: &LockerKey) -> Result<()> {
        // dirtiness is tracked by version mismatch only; nothing persisted
        Ok(())
    }

    async fn list_dirty_keys(&self) -> Result<Vec<LockerKey>> {
        Ok(Vec::new())
    }

    async fn begin(&self) -> Result<Self::Txn> {
        self.session.begin().await
    }

    async fn commit(&self, txn: Self::Txn) -> Result<()> {
        self.session.commit(txn).await
    }

    async fn rollback(&self, txn: Self::Txn) -> Result<()> {
        self.session.rollback(txn).await
    }

    async fn barrier(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        branch: BranchType,
    ) -> Result<bool> {
        self.barrier.check(self.session.as_ref(), txn, ctx, branch).await
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
                self.provider.flush_wal(txn, &wal).await?;
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
                self.provider.flush_wal(txn, &wal).await?;
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
        let reservation = match self.provider.load_reservation(txn, ctx).await? {
            Reservation::Found(wal) => wal,
            Reservation::Missing { code, message } => {
                return Ok(BranchResult::Veto { code, message })
            }
        };

        match self.provider.generate_wal_confirm(ctx, key, value, &reservation) {
            None => Ok(BranchResult::Noop),
            Some(wal) => {
                self.provider.flush_wal(txn, &wal).await?;
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
        let reservation = match self.provider.load_reservation(txn, ctx).await? {
            Reservation::Found(wal) => wal,
            Reservation::Missing { code, message } => {
                return Ok(BranchResult::Veto { code, message })
            }
        };

        match self.provider.generate_wal_cancel(ctx, key, value, &reservation) {
            None => Ok(BranchResult::Noop),
            Some(wal) => {
                self.provider.flush_wal(txn, &wal).await?;
                Ok(BranchResult::Stage(wal))
            }
        }
    }

    fn apply(&self, value: &mut Self::Value, wal: &Self::Wal) -> Result<()> {
        self.provider.apply_wal(value, std::slice::from_ref(wal))
    }
}
