use crate::storage::StorageError;
use crate::types::{EntryId, Index};

/// Inconsistency is a violated log invariant. Continuing after one risks diverging from the
/// leader's log, so the owner of the log must treat it as fatal and stop the raft instance.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Inconsistency {
    #[error(
        "tocommit({commit}) is out of range [last_index({last_index})]. Was the raft log corrupted, truncated, or lost?"
    )]
    CommitOutOfRange { commit: Index, last_index: Index },
    #[error("applied({applied}) is out of range [prev_applied({prev_applied}), committed({committed})]")]
    AppliedOutOfRange {
        applied: Index,
        prev_applied: Index,
        committed: Index,
    },
    #[error("applying({applying}) is out of range [prev_applying({prev_applying}), committed({committed})]")]
    ApplyingOutOfRange {
        applying: Index,
        prev_applying: Index,
        committed: Index,
    },
    #[error("entry {index} is already committed [committed({committed})]")]
    OverwriteCommitted { index: Index, committed: Index },
    #[error("gap in the log at index {index}")]
    LogGap { index: Index },
    #[error("entries({lo}:{hi}] is unavailable from storage")]
    EntriesUnavailable { lo: Index, hi: Index },
    #[error("invalid slice {lo} > {hi}")]
    InvalidSlice { lo: Index, hi: Index },
    #[error("slice({lo},{hi}] out of bound ({compacted},{last_index}]")]
    SliceOutOfBounds {
        lo: Index,
        hi: Index,
        compacted: Index,
        last_index: Index,
    },
    #[error("malformed log slice: {next:?} can not follow {prev:?}")]
    MalformedSlice { prev: EntryId, next: EntryId },
    #[error("got 0 entries in ({lo}, {hi}]")]
    EmptyPage { lo: Index, hi: Index },
}

/// LogError is returned by log reads.
///
/// `Compacted` and `Unavailable` are expected: the caller retries with an adjusted range or falls
/// back to sending a snapshot. `Inconsistent` is not, see [`Inconsistency`].
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("requested index is unavailable due to compaction")]
    Compacted,
    #[error("requested entry at index is unavailable")]
    Unavailable,
    #[error("storage failure")]
    Storage(#[source] StorageError),
    #[error(transparent)]
    Inconsistent(#[from] Inconsistency),
}

impl LogError {
    /// True if the raft instance must not continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LogError::Inconsistent(_))
    }
}

impl From<StorageError> for LogError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Compacted => LogError::Compacted,
            StorageError::Unavailable => LogError::Unavailable,
            other => LogError::Storage(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogCreationError {
    #[error("Illegal options for configuring raft log: {0}")]
    IllegalOptions(String),
    #[error("Failed to read initial state from storage")]
    Storage(#[from] StorageError),
}
