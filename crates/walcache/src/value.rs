//! The capability contract of cached business values.

/// Capability set every cached business value implements.
///
/// The engine never inspects the business payload; it only needs version
/// bookkeeping and the dirty hint:
///
/// - `version` counts applied WAL records and never decreases
/// - `db_version` is the version last persisted to the backing store
/// - `version >= db_version` always; they are equal exactly when the last
///   applied WAL has been flushed
/// - `dirty` is a fast in-memory hint; the flusher treats a version mismatch
///   as the durable truth and flushes on the OR of both
pub trait LockerValue: Send + Sync + 'static {
    /// Number of WAL records applied to this value.
    fn version(&self) -> u64;

    /// Version last persisted to the backing store.
    fn db_version(&self) -> u64;

    /// Records that the store now reflects `version`.
    fn set_db_version(&mut self, version: u64);

    /// Fast dirty hint.
    fn is_dirty(&self) -> bool;

    /// Sets or clears the dirty hint.
    fn set_dirty(&mut self, dirty: bool);
}
