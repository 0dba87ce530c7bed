//! The cache coordinator: public branch operations over a back end.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use tracing::{debug, error, info, warn};
use walcache_core::{BranchType, Error, LockerKey, Result, TccContext, TccOutcome};

use crate::backend::{Backend, BranchResult};
use crate::flusher::FlushReport;
use crate::guard::ValueGuard;
use crate::metrics::{BRANCHES_TOTAL, DIRTY_FLUSHED_TOTAL, KEYS_TOTAL, LOCK_WAIT_SECONDS};
use crate::registry::LockerRegistry;
use crate::value::LockerValue;

/// Which branch to run, with its body where the branch takes one.
enum BranchCall<'a, B: Backend> {
    Must(&'a B::Body),
    Try(&'a B::Body),
    Confirm,
    Cancel,
}

impl<B: Backend> BranchCall<'_, B> {
    fn branch_type(&self) -> BranchType {
        match self {
            Self::Must(_) => BranchType::Must,
            Self::Try(_) => BranchType::Try,
            Self::Confirm => BranchType::Confirm,
            Self::Cancel => BranchType::Cancel,
        }
    }
}

/// Write-ahead-log cache coordinator.
///
/// Owns the locker registry and drives every public operation through the
/// same shape: acquire the per-key mutex (loading the value on first
/// access), open the back end's transaction scope, check the barrier, run
/// the business phase, then commit-and-apply or roll back.
///
/// For a fixed key, operations are totally ordered by the locker mutex;
/// across keys there is no ordering. Each operation holds at most one locker
/// at a time.
pub struct Cache<B: Backend> {
    name: String,
    backend: Arc<B>,
    registry: LockerRegistry<B::Value>,
}

impl<B: Backend> Cache<B> {
    /// Creates a cache over a back end. `name` labels logs for hosts running
    /// several caches.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self { name: name.into(), backend: Arc::new(backend), registry: LockerRegistry::new() }
    }

    /// The cache name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The back end driving this cache.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Best-effort snapshot of all known keys.
    #[must_use]
    pub fn keys(&self) -> Vec<LockerKey> {
        self.registry.keys()
    }

    /// Number of keys ever referenced.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if no key has been referenced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Loads (if needed) and locks the value for `key`.
    ///
    /// The returned guard releases the mutex on drop, on every path
    /// including unwinding. A panic inside initialization is converted into
    /// [`Error::Panic`]; the slot stays empty so the next caller retries
    /// from scratch.
    async fn load_and_lock(
        &self,
        key: &LockerKey,
        op: &'static str,
    ) -> Result<ValueGuard<B::Value>> {
        let slot = self.registry.ensure(key);
        let start = Instant::now();
        let mut guard = slot.lock_owned().await;
        histogram!(LOCK_WAIT_SECONDS).record(start.elapsed().as_secs_f64());

        if guard.is_none() {
            let init = AssertUnwindSafe(self.backend.initialize(key)).catch_unwind().await;
            let value = match init {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => return Err(e),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(key = %key, message = %message, "panic while initializing value");
                    return Err(Error::Panic(message));
                }
            };
            *guard = Some(value);
            debug!(key = %key, "value loaded from persistent store");
        }

        Ok(ValueGuard::new(guard, op))
    }

    /// Returns a snapshot of the value for `key`, loading it on first
    /// access.
    ///
    /// The per-key mutex is held only for the duration of the load and the
    /// clone; there is no read lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be loaded.
    pub async fn get(&self, key: &LockerKey) -> Result<B::Value>
    where
        B::Value: Clone,
    {
        let guard = self.load_and_lock(key, "get").await?;
        Ok(guard.value().clone())
    }

    /// Runs a one-shot Must branch: apply unconditionally, no later confirm
    /// or cancel.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; business vetoes are reported in
    /// the outcome, not as errors.
    pub async fn must(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        body: &B::Body,
    ) -> Result<TccOutcome> {
        self.run_branch(ctx, key, BranchCall::Must(body)).await
    }

    /// Runs the Try phase of a TCC branch, recording a reservation.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; business vetoes are reported in
    /// the outcome, not as errors.
    pub async fn try_branch(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        body: &B::Body,
    ) -> Result<TccOutcome> {
        self.run_branch(ctx, key, BranchCall::Try(body)).await
    }

    /// Runs the Confirm phase, settling the reservation written by Try.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure; a missing reservation is reported
    /// in the outcome, not as an error.
    pub async fn confirm(&self, ctx: &TccContext, key: &LockerKey) -> Result<TccOutcome> {
        self.run_branch(ctx, key, BranchCall::Confirm).await
    }

    /// Runs the Cancel phase, compensating the reservation written by Try.
    ///
    /// Cancel with no prior Try (empty rollback) succeeds silently and
    /// suppresses the late Try.
    ///
    /// # Errors
    ///
    /// Returns an error on system failure.
    pub async fn cancel(&self, ctx: &TccContext, key: &LockerKey) -> Result<TccOutcome> {
        self.run_branch(ctx, key, BranchCall::Cancel).await
    }

    /// Runs `merger` on the value for `key` under the per-key mutex.
    ///
    /// The merger may mutate the value freely; it reports whether it changed
    /// anything, and that report is passed through.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be loaded.
    pub async fn update<F>(&self, key: &LockerKey, merger: F) -> Result<bool>
    where
        F: FnOnce(&mut B::Value) -> bool + Send,
    {
        let mut guard = self.load_and_lock(key, "update").await?;
        Ok(merger(guard.value_mut()))
    }

    /// Visits every known key in turn, locking each for the duration of its
    /// visit. Keys whose value is still initializing are skipped with a
    /// warning. The visitor returns `false` to stop iteration.
    pub async fn traverse<F>(&self, mut visitor: F)
    where
        F: FnMut(&LockerKey, &B::Value) -> bool + Send,
    {
        for key in self.registry.keys() {
            let slot = self.registry.ensure(&key);
            let guard = slot.lock_owned().await;
            match guard.as_ref() {
                None => {
                    warn!(key = %key, "value is not initialized yet, skipping");
                }
                Some(value) => {
                    if !visitor(&key, value) {
                        break;
                    }
                }
            }
        }
    }

    /// Writes every dirty value back to the persistent store.
    ///
    /// A value is dirty if its flag is set or its version is ahead of the
    /// persisted one. Stops at the first failure; values flushed before the
    /// failure stay flushed.
    ///
    /// # Errors
    ///
    /// Returns the first persistence error encountered.
    pub async fn flush_dirty(&self) -> Result<FlushReport> {
        let keys = self.registry.keys();
        let total = keys.len();
        let mut refreshed = 0usize;

        for key in keys {
            let slot = self.registry.ensure(&key);
            let mut guard = slot.lock_owned().await;
            let Some(value) = guard.as_mut() else {
                warn!(key = %key, "value is not initialized yet, skipping");
                continue;
            };

            if value.is_dirty() || value.db_version() != value.version() {
                if let Err(e) = self.backend.persist(&key, value).await {
                    error!(key = %key, error = %e, "failed to flush value");
                    return Err(e);
                }
                value.set_db_version(value.version());
                value.set_dirty(false);
                self.backend.clear_dirty_marker(&key).await?;
                refreshed += 1;
            }
        }

        gauge!(KEYS_TOTAL).set(total as f64);
        counter!(DIRTY_FLUSHED_TOTAL).increment(refreshed as u64);
        info!(cache = %self.name, total, refreshed, "flushed dirty values");

        Ok(FlushReport { total, refreshed })
    }

    /// Restart recovery: drains WAL for every key with a persisted dirty
    /// marker by loading it once (load, replay, persist, clear marker).
    ///
    /// Back ends without persisted markers have nothing to recover.
    ///
    /// # Errors
    ///
    /// Returns the first load failure encountered.
    pub async fn clear_dirty_records(&self) -> Result<()> {
        let keys = self.backend.list_dirty_keys().await?;
        for key in keys {
            info!(key = %key, "clearing dirty key");
            match self.load_and_lock(&key, "recover").await {
                Ok(guard) => {
                    let value = guard.value();
                    info!(
                        key = %key,
                        version = value.version(),
                        db_version = value.db_version(),
                        "cleared dirty key"
                    );
                }
                Err(e) => {
                    error!(key = %key, error = %e, "failed to clear dirty key");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// The shared branch ceremony: lock, begin, barrier, business phase,
    /// commit or roll back, apply.
    async fn run_branch(
        &self,
        ctx: &TccContext,
        key: &LockerKey,
        call: BranchCall<'_, B>,
    ) -> Result<TccOutcome> {
        let branch = call.branch_type();
        let mut guard = self.load_and_lock(key, branch.as_str()).await?;

        let mut txn = self.backend.begin().await?;

        let call_it = match self.backend.barrier(&mut txn, ctx, branch).await {
            Ok(call_it) => call_it,
            Err(e) => {
                self.abort(txn).await;
                return Err(e);
            }
        };
        if !call_it {
            // claims staged by the barrier itself (empty rollback) must land
            self.backend.commit(txn).await?;
            debug!(
                gid = %ctx.global_id,
                bid = %ctx.branch_id,
                branch = branch.as_str(),
                "duplicate call suppressed"
            );
            record_branch(branch, "duplicate");
            return Ok(TccOutcome::duplicate());
        }

        let result = match call {
            BranchCall::Must(body) => {
                self.backend.do_must(&mut txn, ctx, key, guard.value(), body).await
            }
            BranchCall::Try(body) => {
                self.backend.do_try(&mut txn, ctx, key, guard.value(), body).await
            }
            BranchCall::Confirm => self.backend.do_confirm(&mut txn, ctx, key, guard.value()).await,
            BranchCall::Cancel => self.backend.do_cancel(&mut txn, ctx, key, guard.value()).await,
        };

        match result {
            Err(e) => {
                self.abort(txn).await;
                debug!(
                    gid = %ctx.global_id,
                    bid = %ctx.branch_id,
                    branch = branch.as_str(),
                    error = %e,
                    "transaction reverted"
                );
                record_branch(branch, "error");
                Err(e)
            }
            Ok(BranchResult::Veto { code, message }) => {
                self.abort(txn).await;
                debug!(
                    gid = %ctx.global_id,
                    bid = %ctx.branch_id,
                    branch = branch.as_str(),
                    code = %code,
                    "branch vetoed, transaction reverted"
                );
                record_branch(branch, "veto");
                Ok(TccOutcome::failed(code, message))
            }
            Ok(BranchResult::Noop) => {
                self.backend.commit(txn).await?;
                record_branch(branch, "success");
                Ok(TccOutcome::success())
            }
            Ok(BranchResult::Stage(wal)) => {
                self.backend.commit(txn).await?;
                // the WAL is durable now; memory must follow or the process
                // cannot be trusted to serve this key
                if let Err(e) = self.backend.apply(guard.value_mut(), &wal) {
                    error!(key = %key, error = %e, "failed to apply committed wal");
                    panic!("walcache: failed to apply committed wal for key {key}: {e}");
                }
                record_branch(branch, "success");
                Ok(TccOutcome::success())
            }
        }
    }

    /// Rolls `txn` back, demoting a rollback failure to a warning.
    async fn abort(&self, txn: B::Txn) {
        if let Err(e) = self.backend.rollback(txn).await {
            warn!(error = %e, "rollback failed");
        }
    }
}

fn record_branch(branch: BranchType, outcome: &'static str) {
    counter!(BRANCHES_TOTAL, "op" => branch.as_str(), "outcome" => outcome).increment(1);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
