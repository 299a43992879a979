use crate::types::{Entry, Index, Snapshot, Term};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested index predates the compaction point; it is only reachable through a snapshot.
    #[error("requested index is unavailable due to compaction")]
    Compacted,
    /// The requested entry is not (or not yet) in storage.
    #[error("requested entry at index is unavailable")]
    Unavailable,
    #[error("requested index is older than the existing snapshot")]
    SnapshotOutOfDate,
    #[error("snapshot is temporarily unavailable")]
    SnapshotTemporarilyUnavailable,
    #[error("storage I/O failure")]
    Io(#[from] io::Error),
}

/// LogStorage is the read-only view of the durable part of the raft log.
///
/// The durable log is contiguous in the `[compacted(), last_index()]` interval. The entry at
/// `compacted()` is not readable, but its term is, so that appends right after the compaction point
/// can still be matched.
pub trait LogStorage {
    /// Returns entries in the `[lo, hi)` interval, with total size up to `max_size`. At least one
    /// entry is returned when the interval is non-empty, even if it is larger than `max_size`.
    ///
    /// Returns `Compacted` if `lo <= compacted()`, and `Unavailable` if any entry in the interval
    /// is missing.
    fn entries(&self, lo: Index, hi: Index, max_size: u64) -> Result<Vec<Entry>, StorageError>;

    /// Returns the term of the entry at `index`, which must be in `[compacted(), last_index()]`.
    fn term(&self, index: Index) -> Result<Term, StorageError>;

    /// Index of the last compacted entry. Entries at or below it are gone.
    fn compacted(&self) -> Index;

    /// Index of the last durable entry.
    fn last_index(&self) -> Index;
}

/// Storage is the durable store of the raft log: the stable entries plus the latest snapshot.
pub trait Storage: LogStorage {
    /// Returns the most recent snapshot. `SnapshotTemporarilyUnavailable` means the caller should
    /// retry later.
    fn snapshot(&self) -> Result<Snapshot, StorageError>;
}
