use crate::storage::{LogStorage, Storage, StorageError};
use crate::types::{limit_size, Entry, Index, Snapshot, Term};
use bytes::Bytes;
use std::io;

// Durability is not modeled here, everything lives in RAM. Good enough for driving the log in
// tests and for embedding applications that persist snapshots elsewhere.
pub struct MemoryStorage {
    // ents[0] sits at the compaction point. Only its term and index are meaningful; it is never
    // returned by entries().
    ents: Vec<Entry>,
    snapshot: Snapshot,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            ents: vec![Entry::new(0, 0, Bytes::new())],
            snapshot: Snapshot::default(),
        }
    }

    /// Creates an empty log that starts right after the given snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let meta = snapshot.metadata;
        MemoryStorage {
            ents: vec![Entry::new(meta.term, meta.index, Bytes::new())],
            snapshot,
        }
    }

    fn offset(&self) -> Index {
        self.ents[0].index
    }

    /// Appends entries to the durable log. A prefix that is already compacted is skipped, and any
    /// suffix of the stored log that conflicts with `entries` is overwritten.
    pub fn append(&mut self, entries: &[Entry]) -> Result<(), StorageError> {
        let first = match entries.first() {
            Some(first) => first.index,
            None => return Ok(()),
        };
        let last = first + entries.len() as u64 - 1;
        let offset = self.offset();
        // Everything is already compacted.
        if last <= offset {
            return Ok(());
        }
        let entries = if first <= offset {
            &entries[(offset + 1 - first) as usize..]
        } else {
            entries
        };

        let pos = (entries[0].index - offset) as usize;
        if pos > self.ents.len() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "missing log entry [last: {}, append at: {}]",
                    self.last_index(),
                    entries[0].index
                ),
            )));
        }
        self.ents.truncate(pos);
        self.ents.extend_from_slice(entries);
        Ok(())
    }

    /// Discards all entries up to and including `index`. The term of `index` stays readable.
    pub fn compact(&mut self, index: Index) -> Result<(), StorageError> {
        let offset = self.offset();
        if index <= offset {
            return Err(StorageError::Compacted);
        }
        if index > self.last_index() {
            return Err(StorageError::Unavailable);
        }
        let pos = (index - offset) as usize;
        let mut ents = Vec::with_capacity(self.ents.len() - pos);
        ents.push(Entry::new(self.ents[pos].term, index, Bytes::new()));
        ents.extend_from_slice(&self.ents[pos + 1..]);
        self.ents = ents;
        Ok(())
    }

    /// Replaces the whole log with the given snapshot.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        if snapshot.metadata.index <= self.snapshot.metadata.index {
            return Err(StorageError::SnapshotOutOfDate);
        }
        let meta = snapshot.metadata;
        self.ents = vec![Entry::new(meta.term, meta.index, Bytes::new())];
        self.snapshot = snapshot;
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStorage for MemoryStorage {
    fn entries(&self, lo: Index, hi: Index, max_size: u64) -> Result<Vec<Entry>, StorageError> {
        let offset = self.offset();
        if lo <= offset {
            return Err(StorageError::Compacted);
        }
        if hi > self.last_index() + 1 {
            return Err(StorageError::Unavailable);
        }
        if lo >= hi {
            return Ok(Vec::new());
        }
        let ents = &self.ents[(lo - offset) as usize..(hi - offset) as usize];
        Ok(limit_size(ents, max_size).to_vec())
    }

    fn term(&self, index: Index) -> Result<Term, StorageError> {
        let offset = self.offset();
        if index < offset {
            return Err(StorageError::Compacted);
        }
        match self.ents.get((index - offset) as usize) {
            Some(entry) => Ok(entry.term),
            None => Err(StorageError::Unavailable),
        }
    }

    fn compacted(&self) -> Index {
        self.offset()
    }

    fn last_index(&self) -> Index {
        self.offset() + self.ents.len() as u64 - 1
    }
}

impl Storage for MemoryStorage {
    fn snapshot(&self) -> Result<Snapshot, StorageError> {
        Ok(self.snapshot.clone())
    }
}
