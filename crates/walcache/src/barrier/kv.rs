// Copyright 2026 Walcache Dev
// SPDX-License-Identifier: Apache-2.0

//! KV barrier variant: check-absence now, claim atomically with the WAL.

use walcache_core::{config::BarrierConfig, BarrierKey, BranchType, Result, TccContext};
use walcache_storage::{KvStore, WriteBatch};

/// Barrier over an embedded key-value store.
///
/// The store has no transactions, so a check only *observes* absence; the
/// definitive claim is a put staged into the branch's pending [`WriteBatch`]
/// and written in the same atom as the WAL record. This is sound because the
/// per-key mutex serializes every branch touching the same locker key, and a
/// global id is bound to exactly one locker key.
#[derive(Debug, Clone)]
pub struct KvBarrier {
    name: String,
}

impl KvBarrier {
    /// Creates a barrier from configuration.
    #[must_use]
    pub fn new(config: &BarrierConfig) -> Self {
        Self { name: config.name.clone() }
    }

    /// The barrier key for one branch type of `ctx`.
    #[must_use]
    pub fn key(&self, ctx: &TccContext, branch: BranchType) -> BarrierKey {
        BarrierKey::build(&self.name, ctx, branch)
    }

    /// Checks the barrier for `branch`, returning `true` iff the branch has
    /// not been observed and business logic should run.
    ///
    /// For Cancel with no prior Try (empty rollback) the Try claim is staged
    /// into `batch` so the late Try observes a duplicate once the batch is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn check(
        &self,
        store: &dyn KvStore,
        batch: &mut WriteBatch,
        ctx: &TccContext,
        branch: BranchType,
    ) -> Result<bool> {
        match branch {
            BranchType::Cancel => {
                let try_key = self.key(ctx, BranchType::Try);
                if store.get(try_key.as_bytes()).await?.is_none() {
                    // empty rollback: claim the Try slot so a late Try is
                    // suppressed
                    batch.put(try_key.as_bytes().to_vec(), Vec::new());
                    return Ok(false);
                }

                let cancel_key = self.key(ctx, BranchType::Cancel);
                Ok(store.get(cancel_key.as_bytes()).await?.is_none())
            }
            branch => {
                let key = self.key(ctx, branch);
                Ok(store.get(key.as_bytes()).await?.is_none())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use walcache_storage::RedbKvStore;

    use super::*;

    fn barrier() -> KvBarrier {
        KvBarrier::new(&walcache_core::config::BarrierConfig::default())
    }

    #[tokio::test]
    async fn test_fresh_branch_calls_it() {
        let store = RedbKvStore::open_in_memory().unwrap();
        let barrier = barrier();
        let ctx = TccContext::new("g1", "b1");
        let mut batch = WriteBatch::new();

        assert!(barrier.check(&store, &mut batch, &ctx, BranchType::Try).await.unwrap());
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_claimed_branch_is_duplicate() {
        let store = RedbKvStore::open_in_memory().unwrap();
        let barrier = barrier();
        let ctx = TccContext::new("g1", "b1");

        let try_key = barrier.key(&ctx, BranchType::Try);
        store.put(try_key.as_bytes(), b"wal_acct_1").await.unwrap();

        let mut batch = WriteBatch::new();
        assert!(!barrier.check(&store, &mut batch, &ctx, BranchType::Try).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_without_try_claims_try_slot() {
        let store = RedbKvStore::open_in_memory().unwrap();
        let barrier = barrier();
        let ctx = TccContext::new("g2", "b2");

        let mut batch = WriteBatch::new();
        let call_it = barrier.check(&store, &mut batch, &ctx, BranchType::Cancel).await.unwrap();
        assert!(!call_it);
        assert_eq!(batch.len(), 1);

        // once the batch lands, the late Try is suppressed
        store.write(batch).await.unwrap();
        let mut batch = WriteBatch::new();
        assert!(!barrier.check(&store, &mut batch, &ctx, BranchType::Try).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_after_try_calls_it_once() {
        let store = RedbKvStore::open_in_memory().unwrap();
        let barrier = barrier();
        let ctx = TccContext::new("g3", "b3");

        store.put(barrier.key(&ctx, BranchType::Try).as_bytes(), b"wal_acct_1").await.unwrap();

        let mut batch = WriteBatch::new();
        assert!(barrier.check(&store, &mut batch, &ctx, BranchType::Cancel).await.unwrap());

        store.put(barrier.key(&ctx, BranchType::Cancel).as_bytes(), b"").await.unwrap();
        let mut batch = WriteBatch::new();
        assert!(!barrier.check(&store, &mut batch, &ctx, BranchType::Cancel).await.unwrap());
    }
}
