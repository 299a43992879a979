mod entry;
mod slice;
mod snapshot;

pub use entry::Entry;
pub use entry::EntryId;
pub use entry::Index;
pub use entry::LogMark;
pub use entry::LogSpan;
pub use entry::Term;
pub use slice::LeadSlice;
pub use slice::LogSlice;
pub use slice::NO_LIMIT;
pub use snapshot::LeaderSnapshot;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotMetadata;

pub(crate) use slice::ents_size;
pub(crate) use slice::limit_size;
