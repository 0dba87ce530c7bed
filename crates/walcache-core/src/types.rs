//! Common data types shared across walcache components.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Application-level code reported when a Confirm or Cancel cannot find the
/// reservation written by its Try branch.
pub const ERR_RESERVATION_NOT_FOUND: &str = "ErrReservationNotFound";

/// Opaque identifier of a cached business entity.
///
/// Equality defines the lock shard: all operations on the same key are
/// serialized by one mutex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockerKey(String);

impl LockerKey {
    /// Creates a key from anything string-like.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key as raw bytes, as stored by the KV back end.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for LockerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockerKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LockerKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The scope of one distributed-transaction branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TccContext {
    /// Global transaction identifier.
    pub global_id: String,
    /// Branch identifier within the global transaction.
    pub branch_id: String,
}

impl TccContext {
    /// Creates a context from global and branch identifiers.
    #[must_use]
    pub fn new(global_id: impl Into<String>, branch_id: impl Into<String>) -> Self {
        Self { global_id: global_id.into(), branch_id: branch_id.into() }
    }
}

impl std::fmt::Display for TccContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.global_id, self.branch_id)
    }
}

/// Wire-stable TCC result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(i32)]
pub enum TccCode {
    /// The branch completed (or was a duplicate of a completed branch).
    #[default]
    Success = 0,
    /// The branch was vetoed by business logic; no state was changed.
    Failed = 1,
    /// The branch timed out.
    Timeout = 2,
}

impl TccCode {
    /// Returns the wire representation of this code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Branch types of a TCC transaction, with their wire-stable characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchType {
    /// First-phase reservation.
    Try,
    /// Second-phase settlement of a Try.
    Confirm,
    /// Second-phase compensation of a Try.
    Cancel,
    /// One-shot unconditional branch; no later confirm or cancel.
    Must,
}

impl BranchType {
    /// Returns the single-character wire form (`T`, `C`, `X`, `M`).
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Try => 'T',
            Self::Confirm => 'C',
            Self::Cancel => 'X',
            Self::Must => 'M',
        }
    }

    /// Label used for metrics and logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Try => "try",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Must => "must",
        }
    }
}

impl std::fmt::Display for BranchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Canonical durable marker key recording that one branch type of one branch
/// has been observed.
///
/// The string form is `"<BarrierName>-<GlobalId>-<BranchId>-<Type>"`; presence
/// of the key (a row in the SQL barrier table, a key in the KV store) means
/// the branch type has been processed and must not run again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarrierKey(String);

impl BarrierKey {
    /// Builds the barrier key for one branch type of `ctx`.
    #[must_use]
    pub fn build(barrier_name: &str, ctx: &TccContext, branch: BranchType) -> Self {
        Self(format!(
            "{}-{}-{}-{}",
            barrier_name,
            ctx.global_id,
            ctx.branch_id,
            branch.as_char()
        ))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key as raw bytes, as stored by the KV back end.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for BarrierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A write-ahead-log record for the KV back end.
///
/// `key` is unique per entry (a common scheme is
/// `"wal_<LockerKey>_<Version+1>"`); `payload` is an opaque business
/// serialization. Records are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Storage key of this record.
    pub key: String,
    /// Serialized business mutation.
    pub payload: Bytes,
}

impl WalRecord {
    /// Creates a record from a key and payload bytes.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { key: key.into(), payload: payload.into() }
    }

    /// Builds a WAL key in the `"wal_<LockerKey>_<version>"` scheme.
    ///
    /// Providers are free to use any unique key scheme; this one lets replay
    /// walk versions upward with point reads.
    #[must_use]
    pub fn build_key(key: &LockerKey, version: u64) -> String {
        format!("wal_{key}_{version}")
    }

    /// Parses a key produced by [`WalRecord::build_key`] back into its locker
    /// key and version. Returns `None` for keys in any other scheme.
    #[must_use]
    pub fn parse_key(wal_key: &str) -> Option<(LockerKey, u64)> {
        let rest = wal_key.strip_prefix("wal_")?;
        let (key, version) = rest.rsplit_once('_')?;
        let version = version.parse().ok()?;
        Some((LockerKey::from(key), version))
    }
}

impl std::fmt::Display for WalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wal {} ({} bytes)", self.key, self.payload.len())
    }
}

/// Outcome of one TCC branch as reported to the caller.
///
/// `tcc` is the transport-level verdict; `code` and `message` carry the
/// business-level detail (veto reason, duplicate-call notice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TccOutcome {
    /// Transport-level verdict.
    pub tcc: TccCode,
    /// Business-level code; empty on plain success.
    pub code: String,
    /// Human-readable detail; empty on plain success.
    pub message: String,
}

impl TccOutcome {
    /// A plain successful branch.
    #[must_use]
    pub fn success() -> Self {
        Self { tcc: TccCode::Success, code: String::new(), message: String::new() }
    }

    /// A branch suppressed by the barrier because it already ran.
    #[must_use]
    pub fn duplicate() -> Self {
        Self {
            tcc: TccCode::Success,
            code: String::new(),
            message: "duplicate call".to_string(),
        }
    }

    /// A branch vetoed by business logic.
    #[must_use]
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { tcc: TccCode::Failed, code: code.into(), message: message.into() }
    }

    /// Returns `true` if the branch reported `TccCode::Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tcc == TccCode::Success
    }

    /// Returns `true` if this outcome is a duplicate-call notice.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.tcc == TccCode::Success && self.message == "duplicate call"
    }
}
