mod api;
mod in_memory;

pub use api::LogStorage;
pub use api::Storage;
pub use api::StorageError;
pub use in_memory::MemoryStorage;
