use crate::raftlog::term_cache::TermCache;
use crate::raftlog::{Inconsistency, LogError};
use crate::storage::{LogStorage, StorageError};
use crate::types::{ents_size, limit_size, Entry, EntryId, Index, LeadSlice, LogSlice, LogSpan, Term};

/// LogSnapshot is a point-in-time view of the raft log, for reads outside of the raft instance's
/// own loop (e.g. building appends for several followers at once).
///
/// It borrows both the unstable tail and the storage, so neither can be mutated while it's alive.
/// Storage implementations with interior mutability must still not change the `(compacted,
/// last_index]` range out from under it.
pub struct LogSnapshot<'a, S: ?Sized> {
    // The compacted log index.
    compacted: Index,
    // The stable log entries.
    storage: &'a S,
    // The unstable log entries.
    unstable: &'a LeadSlice,
    // A compressed entry id suffix of the log.
    term_cache: TermCache,
    logger: slog::Logger,
}

/// Where the entries of a `(lo, hi]` read come from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReadPath {
    /// All entries are in the unstable tail.
    Unstable,
    /// All entries are in storage.
    Stable,
    /// `(lo, cut]` is in storage, `(cut, hi]` in the unstable tail.
    Merged { cut: Index },
}

impl<S: ?Sized> Clone for LogSnapshot<'_, S> {
    fn clone(&self) -> Self {
        LogSnapshot {
            compacted: self.compacted,
            storage: self.storage,
            unstable: self.unstable,
            term_cache: self.term_cache.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl<'a, S: LogStorage + ?Sized> LogSnapshot<'a, S> {
    pub(crate) fn new(
        compacted: Index,
        storage: &'a S,
        unstable: &'a LeadSlice,
        term_cache: TermCache,
        logger: slog::Logger,
    ) -> Self {
        LogSnapshot {
            compacted,
            storage,
            unstable,
            term_cache,
            logger,
        }
    }

    pub fn compacted(&self) -> Index {
        self.compacted
    }

    pub fn last_index(&self) -> Index {
        self.unstable.slice.last_index()
    }

    /// Term of the entry at `index`.
    ///
    /// Returns `Compacted` below the compaction point and `Unavailable` past the last index.
    pub fn term(&self, index: Index) -> Result<Term, LogError> {
        // Check the unstable log first, even before computing the valid index range, which may
        // need to access the storage. If we find the entry's term in the unstable log, we know it
        // was in the valid range.
        if index > self.unstable.slice.last_index() {
            return Err(LogError::Unavailable);
        } else if index >= self.unstable.slice.prev.index {
            return Ok(self.unstable.slice.term_at(index));
        } else if index < self.compacted {
            return Err(LogError::Compacted);
        }

        if let Some(term) = self.term_cache.term(index) {
            return Ok(term);
        }
        match self.storage.term(index) {
            Ok(term) => Ok(term),
            Err(StorageError::Compacted) => Err(LogError::Compacted),
            Err(StorageError::Unavailable) => {
                // The log is contiguous in [compacted, last_index], and the bounds were checked
                // above. A missing entry that isn't compacted away is a hole in the log.
                let e = Inconsistency::LogGap { index };
                slog::crit!(self.logger, "{}", e);
                Err(e.into())
            }
            Err(e) => Err(LogError::Storage(e)),
        }
    }

    /// Returns a prefix of the `(lo, hi]` interval of the log, as a slice of the accepted leader's
    /// log, with the total entries size not exceeding `max_size`.
    ///
    /// At least one entry is returned if the interval is not empty. `max_size` can only be exceeded
    /// by that first entry.
    pub fn lead_slice(&self, lo: Index, hi: Index, max_size: u64) -> Result<LeadSlice, LogError> {
        // If the log is compacted at index > lo, this fails with Compacted.
        let prev_term = self.term(lo)?;
        let entries = self.slice(lo, hi, max_size)?;
        Ok(LeadSlice {
            term: self.unstable.term,
            slice: LogSlice::new(EntryId::new(prev_term, lo), entries),
        })
    }

    /// Same as `slice`, for a LogSpan.
    pub fn slice_span(&self, span: LogSpan, max_size: u64) -> Result<Vec<Entry>, LogError> {
        self.slice(span.after, span.last, max_size)
    }

    /// Returns a prefix of the `(lo, hi]` interval of the log, with the total entries size up to
    /// `max_size`. May exceed `max_size` if the first entry (lo+1) is larger. Returns at least one
    /// entry if the interval is non-empty.
    ///
    /// The interval must be within `[compacted, last_index]`. `lo` below the compaction point
    /// fails with `Compacted`; any other out-of-bounds interval is an inconsistency.
    pub fn slice(&self, lo: Index, hi: Index, max_size: u64) -> Result<Vec<Entry>, LogError> {
        self.check_out_of_bounds(lo, hi)?;
        if lo >= hi {
            return Ok(Vec::new());
        }

        match self.read_path(lo, hi) {
            ReadPath::Unstable => Ok(limit_size(self.unstable.slice.sub(lo, hi), max_size).to_vec()),
            ReadPath::Stable => self.stable_entries(lo, hi, max_size),
            ReadPath::Merged { cut } => {
                let mut ents = self.stable_entries(lo, cut, max_size)?;
                // Storage returned fewer entries than requested, so the size limit was reached.
                if (ents.len() as u64) < cut - lo {
                    return Ok(ents);
                }
                let size = ents_size(&ents);
                if size > max_size {
                    return Ok(ents);
                }

                let unstable = limit_size(self.unstable.slice.sub(cut, hi), max_size - size);
                // The unstable part exceeds the remaining budget only if it's a single entry. The
                // stable part is non-empty, so this entry can be left for the next read.
                if unstable.len() == 1 && size.saturating_add(ents_size(unstable)) > max_size {
                    return Ok(ents);
                }
                ents.extend_from_slice(unstable);
                Ok(ents)
            }
        }
    }

    /// Visits all entries in `(lo, hi]`, passing them to `visit` in consecutive pages of up to
    /// `page_size` bytes (a page holding a single larger entry may exceed it).
    ///
    /// If `visit` returns an error, the scan stops and returns it. This can be used to break out
    /// of the scan early.
    pub fn scan<F, E>(&self, mut lo: Index, hi: Index, page_size: u64, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&[Entry]) -> Result<(), E>,
        E: From<LogError>,
    {
        while lo < hi {
            let ents = self.slice(lo, hi, page_size)?;
            if ents.is_empty() {
                let e = Inconsistency::EmptyPage { lo, hi };
                slog::crit!(self.logger, "{}", e);
                return Err(LogError::from(e).into());
            }
            visit(&ents)?;
            lo += ents.len() as u64;
        }
        Ok(())
    }

    fn read_path(&self, lo: Index, hi: Index) -> ReadPath {
        let boundary = self.unstable.slice.prev.index;
        if lo >= boundary {
            ReadPath::Unstable
        } else if hi <= boundary {
            ReadPath::Stable
        } else {
            ReadPath::Merged { cut: boundary }
        }
    }

    /// Reads `(lo, hi]` from storage. The range is known to be in bounds.
    fn stable_entries(&self, lo: Index, hi: Index, max_size: u64) -> Result<Vec<Entry>, LogError> {
        match self.storage.entries(lo + 1, hi + 1, max_size) {
            Ok(ents) => Ok(ents),
            Err(StorageError::Compacted) => Err(LogError::Compacted),
            Err(StorageError::Unavailable) => {
                let e = Inconsistency::EntriesUnavailable { lo, hi };
                slog::crit!(self.logger, "{}", e);
                Err(e.into())
            }
            Err(e) => Err(LogError::Storage(e)),
        }
    }

    /// Checks that `compacted <= lo <= hi <= last_index`.
    fn check_out_of_bounds(&self, lo: Index, hi: Index) -> Result<(), LogError> {
        if lo > hi {
            let e = Inconsistency::InvalidSlice { lo, hi };
            slog::crit!(self.logger, "{}", e);
            return Err(e.into());
        }
        if lo < self.compacted {
            return Err(LogError::Compacted);
        }
        let last_index = self.unstable.slice.last_index();
        if hi > last_index {
            let e = Inconsistency::SliceOutOfBounds {
                lo,
                hi,
                compacted: self.compacted,
                last_index,
            };
            slog::crit!(self.logger, "{}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
