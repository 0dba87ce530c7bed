// Copyright 2026 Walcache Dev
// SPDX-License-Identifier: Apache-2.0

//! SQL barrier variant: insert-if-absent rows in a uniqueness-indexed table.

use walcache_core::{config::BarrierConfig, BarrierKey, BranchType, Result, TccContext};

use crate::provider::SqlSession;

/// Barrier over a SQL table with `Key` as primary key.
///
/// Each check is one conflict-skipping insert executed inside the caller's
/// transaction; if the branch later fails, the rollback unwinds the claim so
/// the whole branch stays retryable.
#[derive(Debug, Clone)]
pub struct SqlBarrier {
    name: String,
    table: String,
}

impl SqlBarrier {
    /// Creates a barrier from configuration.
    #[must_use]
    pub fn new(config: &BarrierConfig) -> Self {
        Self { name: config.name.clone(), table: config.sql_table.clone() }
    }

    /// The barrier key for one branch type of `ctx`.
    #[must_use]
    pub fn key(&self, ctx: &TccContext, branch: BranchType) -> BarrierKey {
        BarrierKey::build(&self.name, ctx, branch)
    }

    /// Checks and claims the barrier for `branch`, returning `true` iff the
    /// branch has not been observed and business logic should run.
    ///
    /// Cancel claims the Try slot first: a new Try claim means there was no
    /// Try (empty rollback) and the Cancel is swallowed, with the claim left
    /// to commit so the late Try gets suppressed.
    ///
    /// # Errors
    ///
    /// Returns an error if a barrier insert cannot be executed.
    pub async fn check<S: SqlSession>(
        &self,
        session: &S,
        txn: &mut S::Txn,
        ctx: &TccContext,
        branch: BranchType,
    ) -> Result<bool> {
        match branch {
            BranchType::Cancel => {
                let try_key = self.key(ctx, BranchType::Try);
                let try_was_new =
                    session.insert_barrier(txn, &self.table, try_key.as_str()).await?;
                if try_was_new {
                    // empty rollback
                    return Ok(false);
                }

                let cancel_key = self.key(ctx, BranchType::Cancel);
                session.insert_barrier(txn, &self.table, cancel_key.as_str()).await
            }
            branch => {
                let key = self.key(ctx, branch);
                session.insert_barrier(txn, &self.table, key.as_str()).await
            }
        }
    }
}
