// Copyright 2026 Walcache Dev
// SPDX-License-Identifier: Apache-2.0

//! Cache metrics emitted through the `metrics` facade.
//!
//! The library only emits; installing a recorder (Prometheus exporter or
//! otherwise) is the host's concern.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Seconds spent waiting to acquire a per-key mutex.
pub const LOCK_WAIT_SECONDS: &str = "walcache_lock_wait_seconds";

/// Seconds a per-key mutex was held, labeled by operation.
pub const LOCK_HOLD_SECONDS: &str = "walcache_lock_hold_seconds";

/// Number of keys known to the locker registry.
pub const KEYS_TOTAL: &str = "walcache_keys_total";

/// Number of values written back by the dirty flusher.
pub const DIRTY_FLUSHED_TOTAL: &str = "walcache_dirty_flushed_total";

/// Number of branch operations, labeled by operation and outcome
/// (`success`, `duplicate`, `veto`, `error`).
pub const BRANCHES_TOTAL: &str = "walcache_branches_total";

/// Initialize cache metric descriptions (call once at startup).
pub fn init_cache_metrics() {
    describe_histogram!(LOCK_WAIT_SECONDS, "Seconds spent waiting for a per-key lock");
    describe_histogram!(LOCK_HOLD_SECONDS, "Seconds a per-key lock was held, by operation");
    describe_gauge!(KEYS_TOTAL, "Number of keys in the locker registry");
    describe_counter!(DIRTY_FLUSHED_TOTAL, "Values written back by the dirty flusher");
    describe_counter!(BRANCHES_TOTAL, "Branch operations by operation and outcome");
}
