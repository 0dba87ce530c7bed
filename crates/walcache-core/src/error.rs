//! Error types for walcache operations.

use thiserror::Error;

use crate::types::LockerKey;

/// A specialized `Result` type for walcache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during walcache operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// KV or SQL storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The persistent store has no value for the key and no initializer is
    /// configured.
    #[error("no persisted value for key {0} and no initializer configured")]
    ValueNotFound(LockerKey),

    /// A business callback panicked; the per-key mutex was released and the
    /// cached slot left empty.
    #[error("panic during value initialization: {0}")]
    Panic(String),

    /// WAL replay produced an inconsistent value during catchup.
    #[error("wal replay error for key {key}: {message}")]
    Replay {
        /// The key being replayed.
        key: LockerKey,
        /// What went wrong.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wraps any displayable storage-layer failure.
    #[must_use]
    pub fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }

    /// Returns `true` if retrying the whole branch may succeed.
    ///
    /// Storage and I/O failures are transient; the other variants need
    /// operator or caller intervention first.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Storage(_))
    }
}
