//! Write-ahead-log cache for short-lived distributed transactions.
//!
//! walcache mediates between TCC branches (Try–Confirm–Cancel, plus one-shot
//! Must) and a slower persistent store. Each business entity is keyed by a
//! [`LockerKey`]; its authoritative in-memory value is protected by a per-key
//! mutex. Every state change is appended to a write-ahead log before it is
//! applied in memory, and the persistent store is refreshed lazily by the
//! dirty flusher.
//!
//! Client retries are absorbed by a durable TCC barrier: duplicate calls,
//! cancel-without-try (empty rollback) and try-after-cancel (suspension) all
//! resolve without re-running business logic.
//!
//! Two back ends implement the same [`Backend`] contract:
//! - [`SqlBackend`] scopes each branch inside a host-provided SQL transaction
//!   (the barrier row and the WAL row share the transaction's atomicity)
//! - [`KvBackend`] batches the barrier claim and the WAL record into a single
//!   atomic [`WriteBatch`](walcache_storage::WriteBatch) on an embedded
//!   key-value store
//!
//! The coordinator, [`Cache`], is generic over the back end and owns lock
//! acquisition, transaction scoping, duplicate-call suppression and metrics.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use walcache::{Cache, KvBackend, LockerKey, TccContext};
//! use walcache_core::config::{BarrierConfig, RedbConfig};
//! use walcache_storage::{KvStore, RedbKvStore};
//!
//! let store: Arc<dyn KvStore> =
//!     Arc::new(RedbKvStore::open(path, &RedbConfig::default())?);
//! let backend = KvBackend::new(store, Arc::new(wallet_provider), &BarrierConfig::default());
//! let cache = Cache::new("wallet", backend);
//!
//! // drain outstanding WAL before serving
//! cache.clear_dirty_records().await?;
//!
//! let ctx = TccContext::new(global_id, branch_id);
//! let key = LockerKey::from("acct:A");
//! let outcome = cache.try_branch(&ctx, &key, &reserve_body).await?;
//! if outcome.is_success() {
//!     // ... later, settle or compensate:
//!     cache.confirm(&ctx, &key).await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod barrier;
pub mod cache;
pub mod flusher;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod value;

mod guard;

pub use backend::{Backend, BranchResult, KvBackend, SqlBackend};
pub use cache::Cache;
pub use flusher::{spawn_flush_loop, FlushReport};
pub use provider::{
    KvBusinessProvider, Reservation, SqlBusinessProvider, SqlSession, WalDecision,
};
pub use value::LockerValue;

pub use walcache_core::{
    BarrierKey, BranchType, Config, Error, LockerKey, Result, TccCode, TccContext, TccOutcome,
    WalRecord, ERR_RESERVATION_NOT_FOUND,
};
