// Copyright 2026 Walcache Dev
// SPDX-License-Identifier: Apache-2.0

//! TCC barrier: the idempotence and suspension guard.
//!
//! A barrier is a monotone record of which (global-id, branch-id,
//! branch-type) triples have been observed. Each check answers one question:
//! has this branch type run before? `true` ("call it") means no: proceed
//! with business logic and claim the key. `false` means the branch already
//! ran (duplicate call) or must never run (empty rollback).
//!
//! The anomalies the barrier absorbs:
//!
//! - **Duplicate call**: a network retry re-delivers a branch; the claim is
//!   already present, so the branch reports success without re-running.
//! - **Empty rollback**: Cancel arrives with no prior Try. The barrier
//!   claims the Try slot itself and swallows the Cancel, so the late Try can
//!   only ever observe a duplicate.
//! - **Suspension**: Try arrives after its Cancel already ran; the Try slot
//!   was claimed during the empty rollback, so the Try is suppressed.

mod kv;
mod sql;

pub use kv::KvBarrier;
pub use sql::SqlBarrier;
