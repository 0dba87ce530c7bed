//! Core types and utilities for the walcache write-ahead-log cache.
//!
//! This crate provides the fundamental building blocks used across all
//! walcache components:
//! - Lock-key, TCC-context and barrier-key types
//! - Error types shared by the engine and storage layers
//! - Configuration management

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{BarrierConfig, Config, FlushConfig, RedbConfig};
pub use error::{Error, Result};
pub use types::{
    BarrierKey, BranchType, LockerKey, TccCode, TccContext, TccOutcome, WalRecord,
    ERR_RESERVATION_NOT_FOUND,
};
