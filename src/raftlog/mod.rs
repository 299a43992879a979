//! The raft log: durable entries in storage, followed by the in-memory unstable tail, plus the
//! commit/apply bookkeeping of a single raft instance.

mod errors;
mod log;
mod log_snapshot;
mod options;
mod term_cache;
mod unstable;

pub use errors::Inconsistency;
pub use errors::LogCreationError;
pub use errors::LogError;
pub use log::RaftLog;
pub use log_snapshot::LogSnapshot;
pub use options::RaftLogOptions;
