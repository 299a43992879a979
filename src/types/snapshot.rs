use crate::types::{EntryId, Index, Term};
use bytes::Bytes;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    /// Index of the last entry covered by the snapshot.
    pub index: Index,
    /// Term of the last entry covered by the snapshot.
    pub term: Term,
}

/// A state machine snapshot replacing all log entries up to `metadata.index`. The log core never
/// looks inside `data`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub data: Bytes,
}

impl Snapshot {
    pub fn new(term: Term, index: Index, data: impl Into<Bytes>) -> Self {
        Snapshot {
            metadata: SnapshotMetadata { index, term },
            data: data.into(),
        }
    }

    pub fn last_entry_id(&self) -> EntryId {
        EntryId::new(self.metadata.term, self.metadata.index)
    }
}

/// A snapshot received from the `term` leader. Like a LeadSlice, the leader term decides whether
/// the log accepts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderSnapshot {
    pub term: Term,
    pub snapshot: Snapshot,
}

impl LeaderSnapshot {
    pub fn new(term: Term, snapshot: Snapshot) -> Self {
        LeaderSnapshot { term, snapshot }
    }

    pub fn last_entry_id(&self) -> EntryId {
        self.snapshot.last_entry_id()
    }
}
