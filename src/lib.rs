mod raftlog;
mod storage;
mod types;

#[cfg(test)]
mod test_utils;

pub use raftlog::Inconsistency;
pub use raftlog::LogCreationError;
pub use raftlog::LogError;
pub use raftlog::LogSnapshot;
pub use raftlog::RaftLog;
pub use raftlog::RaftLogOptions;
pub use storage::LogStorage;
pub use storage::MemoryStorage;
pub use storage::Storage;
pub use storage::StorageError;
pub use types::Entry;
pub use types::EntryId;
pub use types::Index;
pub use types::LeadSlice;
pub use types::LeaderSnapshot;
pub use types::LogMark;
pub use types::LogSlice;
pub use types::LogSpan;
pub use types::Snapshot;
pub use types::SnapshotMetadata;
pub use types::Term;
pub use types::NO_LIMIT;

// `crate::{root_mod}` only holds `mod` and `pub use` statements. Modules are private; the public
// API is exported item by item from here.
