// Copyright 2026 Walcache Dev
// SPDX-License-Identifier: Apache-2.0

//! Periodic dirty-flush driver.
//!
//! The cache never flushes by itself; the host either calls
//! [`Cache::flush_dirty`] at moments of its choosing or opts into the
//! interval loop below.

use std::sync::Arc;

use tokio::time::{interval, Duration};
use walcache_core::config::FlushConfig;

use crate::backend::Backend;
use crate::cache::Cache;

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Keys known to the registry when the pass started.
    pub total: usize,
    /// Values actually written back.
    pub refreshed: usize,
}

/// Start a background task that periodically flushes dirty values.
///
/// The task runs indefinitely; flush failures are logged and the next tick
/// retries (values flushed before a failure stay flushed).
///
/// # Returns
///
/// A `JoinHandle` for the background task.
pub fn spawn_flush_loop<B: Backend>(
    cache: Arc<Cache<B>>,
    config: FlushConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));

        // Wait for the first tick immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = cache.flush_dirty().await {
                tracing::warn!(cache = %cache.name(), error = %e, "dirty flush failed");
            }
        }
    })
}
