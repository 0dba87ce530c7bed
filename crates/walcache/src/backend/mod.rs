//! Back-end contract unifying the SQL and KV cache flavors.
//!
//! The coordinator is generic over [`Backend`]; the two implementations share
//! its shape through a transaction abstraction that, for SQL, is a real
//! transaction scope and, for KV, degenerates to a single pending write
//! batch:
//!
//! - [`SqlBackend`]: barrier rows and WAL rows inside the host's SQL
//!   transaction; commit/rollback are the database's.
//! - [`KvBackend`]: barrier claims and WAL records staged into one
//!   [`WriteBatch`](walcache_storage::WriteBatch); commit is the atomic batch
//!   write, rollback just drops the batch.

mod kv;
mod sql;

use async_trait::async_trait;
use walcache_core::{BranchType, LockerKey, Result, TccContext};

use crate::value::LockerValue;

pub use kv::{KvAtom, KvBackend};
pub use sql::SqlBackend;

/// What a branch's business phase decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchResult<W> {
    /// Business veto: the coordinator rolls the transaction back and reports
    /// `TccCode::Failed` with the given detail, without surfacing a system
    /// error.
    Veto {
        /// Business-level code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// A WAL record was staged; the coordinator commits, then applies it to
    /// the in-memory value.
    Stage(W),
    /// Nothing to do (null WAL from Confirm/Cancel); the coordinator commits
    /// whatever was staged (the barrier claim) and reports success.
    Noop,
}

/// One flavor of barrier-plus-WAL persistence.
///
/// All value access happens under the per-key mutex held by the coordinator;
/// implementations never lock.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Cached business value.
    type Value: LockerValue;
    /// Body of a Try/Must request.
    type Body: Send + Sync + 'static;
    /// WAL record shape.
    type Wal: Send + 'static;
    /// Per-branch transaction scope.
    type Txn: Send + 'static;

    /// Builds the initial in-memory value for `key`: load the persisted
    /// snapshot (or materialize a fresh one), replay outstanding WAL, persist
    /// if replay applied anything, and clear dirty state.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the caller leaves the slot empty
    /// so the next access retries from scratch.
    async fn initialize(&self, key: &LockerKey) -> Result<Self::Value>;

    /// Writes the full value snapshot through to the persistent store.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be performed.
    async fn persist(&self, key: &LockerKey, value: &Self::Value) -> Result<()>;

    /// Clears the persisted dirty marker for `key`, where the back end keeps
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be cleared.
    async fn clear_dirty_marker(&self, key: &LockerKey) -> Result<()>;

    /// Lists keys with a persisted dirty marker. Back ends without persisted
    /// markers return an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be performed.
    async fn list_dirty_keys(&self) -> Result<Vec<LockerKey>>;

    /// Opens the transaction scope for one branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope cannot be opened.
    async fn begin(&self) -> Result<Self::Txn>;

    /// Makes everything staged in `txn` durable, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing staged is visible then.
    async fn commit(&self, txn: Self::Txn) -> Result<()>;

    /// Discards everything staged in `txn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback itself fails.
    async fn rollback(&self, txn: Self::Txn) -> Result<()>;

    /// Barrier check-and-claim for `branch`; `true` means the branch has not
    /// run and business logic should proceed.
    ///
    /// # Errors
    ///
    /// Returns an error if barrier storage cannot be reached.
    async fn barrier(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        branch: BranchType,
    ) -> Result<bool>;

    /// Runs the business phase of a Must branch: generate the WAL and stage
    /// it (with its barrier claim, for back ends that defer claims).
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; business vetoes come back as
    /// [`BranchResult::Veto`].
    async fn do_must(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<BranchResult<Self::Wal>>;

    /// Runs the business phase of a Try branch.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; business vetoes come back as
    /// [`BranchResult::Veto`].
    async fn do_try(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<BranchResult<Self::Wal>>;

    /// Runs the business phase of a Confirm branch: look up the Try
    /// reservation, compute the settlement WAL, stage it.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; a missing reservation comes back
    /// as [`BranchResult::Veto`].
    async fn do_confirm(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
    ) -> Result<BranchResult<Self::Wal>>;

    /// Runs the business phase of a Cancel branch: look up the Try
    /// reservation, compute the compensation WAL, stage it.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; a missing reservation comes back
    /// as [`BranchResult::Veto`].
    async fn do_cancel(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
    ) -> Result<BranchResult<Self::Wal>>;

    /// Applies a committed WAL record to the in-memory value.
    ///
    /// # Errors
    ///
    /// Must not fail for a record this back end staged: the record is already
    /// durable, so the coordinator treats a failure here as fatal.
    fn apply(&self, value: &mut Self::Value, wal: &Self::Wal) -> Result<()>;
}
