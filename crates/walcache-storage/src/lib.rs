//! Storage backends for the walcache write-ahead-log cache.
//!
//! This crate provides:
//! - The [`KvStore`] contract consumed by the KV-flavored cache engine
//! - A redb-based implementation with persisted dirty markers
//! - An in-memory implementation for tests
//!
//! The SQL back end has no counterpart here: its storage surface is the
//! host's own database, reached through the engine's `SqlSession` trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod kv;
pub mod memory;
pub mod redb_backend;

pub use kv::{BatchOp, KvStore, WriteBatch};
pub use memory::MemoryKvStore;
pub use redb_backend::RedbKvStore;
