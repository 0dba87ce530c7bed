//! Contracts the cache engine consumes from the host.
//!
//! The engine owns locking, barriers and transaction scoping; everything it
//! does not own arrives through these traits:
//!
//! - [`SqlSession`]: the host's database handle for the SQL back end
//!   (transaction lifecycle plus barrier-row insertion)
//! - [`SqlBusinessProvider`]: business callbacks for the SQL back end,
//!   with an opaque WAL record type
//! - [`KvBusinessProvider`]: business callbacks for the KV back end, with
//!   [`WalRecord`] (key + payload bytes) as the WAL shape
//!
//! WAL generation callbacks are pure computation and therefore synchronous;
//! everything touching storage is async.

use async_trait::async_trait;
use walcache_core::{LockerKey, Result, TccContext, WalRecord};
use walcache_storage::KvStore;

use crate::value::LockerValue;

/// Decision of a Try/Must WAL generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalDecision<W> {
    /// Proceed: persist this WAL record and apply it in memory.
    Wal(W),
    /// Business veto: nothing is persisted and the branch reports
    /// `TccCode::Failed` with the given detail. The barrier insertion is
    /// rolled back so a corrected retry is allowed.
    Veto {
        /// Business-level code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

/// Result of looking up the reservation written by a Try branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation<W> {
    /// The Try WAL record.
    Found(W),
    /// No reservation; the branch reports `TccCode::Failed` with the given
    /// detail (conventionally [`ERR_RESERVATION_NOT_FOUND`]).
    ///
    /// [`ERR_RESERVATION_NOT_FOUND`]: walcache_core::ERR_RESERVATION_NOT_FOUND
    Missing {
        /// Business-level code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

/// The host's SQL database handle.
///
/// One transaction scopes one top-level branch: the barrier row insert, the
/// WAL row insert and any business reads share it, so a rollback unwinds the
/// branch completely.
///
/// The barrier table has the layout
/// `Key VARCHAR(100) PRIMARY KEY, Time TIMESTAMP` with an index on `Time`;
/// the host owns its creation.
#[async_trait]
pub trait SqlSession: Send + Sync + 'static {
    /// The transaction handle.
    type Txn: Send + 'static;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be opened.
    async fn begin(&self) -> Result<Self::Txn>;

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction is then rolled
    /// back by the database.
    async fn commit(&self, txn: Self::Txn) -> Result<()>;

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback itself fails.
    async fn rollback(&self, txn: Self::Txn) -> Result<()>;

    /// Inserts `barrier_key` into the barrier table, skipping on conflict
    /// (`INSERT ... IGNORE` or the dialect's equivalent). Returns `true` iff
    /// the row was new.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert cannot be executed.
    async fn insert_barrier(
        &self,
        txn: &mut Self::Txn,
        table: &str,
        barrier_key: &str,
    ) -> Result<bool>;
}

/// Business callbacks for the SQL back end.
///
/// The WAL record is an opaque domain type (`Self::Wal`); the provider owns
/// its table layout, its replay query and the reservation lookup.
#[async_trait]
pub trait SqlBusinessProvider: Send + Sync + 'static {
    /// Cached business value.
    type Value: LockerValue;
    /// Body of a Try/Must request.
    type Body: Send + Sync + 'static;
    /// Opaque WAL record.
    type Wal: Send + Sync + 'static;
    /// Transaction handle; must match the session's.
    type Txn: Send + 'static;

    /// Loads the persisted value, or `None` if the store has never seen the
    /// key.
    ///
    /// # Errors
    ///
    /// Returns an error if the load cannot be performed.
    async fn load_value(&self, key: &LockerKey) -> Result<Option<Self::Value>>;

    /// Materializes a fresh value for a key absent from the store.
    ///
    /// The default declines, which makes absence a hard error
    /// (`Error::ValueNotFound`).
    fn materialize(&self, key: &LockerKey) -> Option<Self::Value> {
        let _ = key;
        None
    }

    /// Writes the full value snapshot through to the store. Must be
    /// idempotent with respect to replays.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be performed.
    async fn persist_value(&self, key: &LockerKey, value: &Self::Value) -> Result<()>;

    /// Replays outstanding WAL records onto `value` in order, skipping
    /// records whose version is already reflected. Returns `true` iff
    /// anything was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if replay cannot complete; the value must not be
    /// installed in that case.
    async fn catchup_wals(&self, key: &LockerKey, value: &mut Self::Value) -> Result<bool>;

    /// Computes the WAL record of a Try branch, or vetoes it.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure (as opposed to a business veto).
    fn generate_wal_try(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<WalDecision<Self::Wal>>;

    /// Computes the WAL record of a Must branch, or vetoes it.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure (as opposed to a business veto).
    fn generate_wal_must(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<WalDecision<Self::Wal>>;

    /// Computes the settlement WAL for a Confirm from the Try reservation.
    /// `None` means nothing to do; the branch still succeeds.
    fn generate_wal_confirm(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        reservation: &Self::Wal,
    ) -> Option<Self::Wal>;

    /// Computes the compensation WAL for a Cancel from the Try reservation.
    /// `None` means nothing to do; the branch still succeeds.
    fn generate_wal_cancel(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        reservation: &Self::Wal,
    ) -> Option<Self::Wal>;

    /// Finds the WAL written by the Try branch of `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup cannot be performed.
    async fn load_reservation(
        &self,
        txn: &mut Self::Txn,
        ctx: &TccContext,
    ) -> Result<Reservation<Self::Wal>>;

    /// Persists one WAL record inside the branch transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be performed.
    async fn flush_wal(&self, txn: &mut Self::Txn, wal: &Self::Wal) -> Result<()>;

    /// Applies committed WAL records to the in-memory value, incrementing its
    /// version once per record.
    ///
    /// # Errors
    ///
    /// Must not fail for well-formed records: a failure here, after the WAL
    /// is durable, is treated as fatal by the engine.
    fn apply_wal(&self, value: &mut Self::Value, wals: &[Self::Wal]) -> Result<()>;
}

/// Business callbacks for the KV back end.
///
/// WAL records are [`WalRecord`]s; a common key scheme is
/// `"wal_<LockerKey>_<Version+1>"`, which lets replay walk versions upward
/// with point reads. Value snapshots (`load_value` / `persist_value`) live
/// wherever the provider keeps them, possibly the same store.
#[async_trait]
pub trait KvBusinessProvider: Send + Sync + 'static {
    /// Cached business value.
    type Value: LockerValue;
    /// Body of a Try/Must request.
    type Body: Send + Sync + 'static;

    /// Loads the persisted value snapshot, or `None` if the store has never
    /// seen the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the load cannot be performed.
    async fn load_value(&self, key: &LockerKey) -> Result<Option<Self::Value>>;

    /// Materializes a fresh value for a key absent from the store.
    ///
    /// The default declines, which makes absence a hard error
    /// (`Error::ValueNotFound`).
    fn materialize(&self, key: &LockerKey) -> Option<Self::Value> {
        let _ = key;
        None
    }

    /// Writes the full value snapshot through. Must be idempotent with
    /// respect to replays.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be performed.
    async fn persist_value(&self, key: &LockerKey, value: &Self::Value) -> Result<()>;

    /// Replays outstanding WAL records from `store` onto `value` in order,
    /// using `value`'s version to skip already-reflected records. Returns
    /// `true` iff anything was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if replay cannot complete; the value must not be
    /// installed in that case.
    async fn catchup_wals(
        &self,
        store: &dyn KvStore,
        key: &LockerKey,
        value: &mut Self::Value,
    ) -> Result<bool>;

    /// Computes the WAL record of a Try branch, or vetoes it.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure (as opposed to a business veto).
    fn generate_wal_try(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<WalDecision<WalRecord>>;

    /// Computes the WAL record of a Must branch, or vetoes it.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure (as opposed to a business veto).
    fn generate_wal_must(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        body: &Self::Body,
    ) -> Result<WalDecision<WalRecord>>;

    /// Computes the settlement WAL for a Confirm from the Try reservation.
    /// `None` means nothing to do; the branch still succeeds.
    fn generate_wal_confirm(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        reservation: &WalRecord,
    ) -> Option<WalRecord>;

    /// Computes the compensation WAL for a Cancel from the Try reservation.
    /// `None` means nothing to do; the branch still succeeds.
    fn generate_wal_cancel(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        value: &Self::Value,
        reservation: &WalRecord,
    ) -> Option<WalRecord>;

    /// Applies committed WAL records to the in-memory value, incrementing its
    /// version once per record.
    ///
    /// # Errors
    ///
    /// Must not fail for well-formed records: a failure here, after the WAL
    /// is durable, is treated as fatal by the engine.
    fn apply_wal(&self, value: &mut Self::Value, wals: &[WalRecord]) -> Result<()>;
}
