use crate::raftlog::Inconsistency;
use crate::types::{Entry, EntryId, Index, Term};

/// Pass as `max_size` to disable size limiting of reads.
pub const NO_LIMIT: u64 = u64::MAX;

/// LogSlice is a contiguous run of entries, together with the id of the entry that immediately
/// precedes them.
///
/// Well-formed iff `entries[i].index == prev.index + 1 + i` for every `i`, and entry terms do not
/// decrease (starting from `prev.term`). See [`LogSlice::valid`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSlice {
    pub prev: EntryId,
    pub entries: Vec<Entry>,
}

impl LogSlice {
    pub fn new(prev: EntryId, entries: Vec<Entry>) -> Self {
        LogSlice { prev, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_index(&self) -> Index {
        self.prev.index + self.entries.len() as u64
    }

    pub fn last_entry_id(&self) -> EntryId {
        match self.entries.last() {
            Some(last) => last.id(),
            None => self.prev,
        }
    }

    /// Term of the entry at `index`. Caller guarantees `prev.index <= index <= last_index()`.
    pub(crate) fn term_at(&self, index: Index) -> Term {
        if index == self.prev.index {
            return self.prev.term;
        }
        self.entries[(index - self.prev.index - 1) as usize].term
    }

    /// Entries in the `(lo, hi]` interval. Caller guarantees
    /// `prev.index <= lo <= hi <= last_index()`.
    pub(crate) fn sub(&self, lo: Index, hi: Index) -> &[Entry] {
        let offset = self.prev.index + 1;
        &self.entries[(lo + 1 - offset) as usize..(hi + 1 - offset) as usize]
    }

    /// Drops the entries up to and including `index`, making the entry at `index` the new `prev`.
    /// Caller guarantees `prev.index <= index <= last_index()`.
    pub(crate) fn forward(&mut self, index: Index) {
        if index == self.prev.index {
            return;
        }
        let n = (index - self.prev.index) as usize;
        self.prev = self.entries[n - 1].id();
        self.entries.drain(..n);
    }

    /// Checks that the slice is well-formed.
    pub fn valid(&self) -> Result<(), Inconsistency> {
        let mut prev = self.prev;
        for entry in &self.entries {
            if entry.index != prev.index + 1 || entry.term < prev.term {
                return Err(Inconsistency::MalformedSlice {
                    prev,
                    next: entry.id(),
                });
            }
            prev = entry.id();
        }
        Ok(())
    }
}

/// LeadSlice is a LogSlice that is known to be a part of the log of the `term` leader. Appends
/// are accepted or rejected based on this term (see `RaftLog::acc_term`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeadSlice {
    pub term: Term,
    pub slice: LogSlice,
}

impl LeadSlice {
    pub fn new(term: Term, prev: EntryId, entries: Vec<Entry>) -> Self {
        LeadSlice {
            term,
            slice: LogSlice::new(prev, entries),
        }
    }

    pub fn prev(&self) -> EntryId {
        self.slice.prev
    }

    pub fn entries(&self) -> &[Entry] {
        &self.slice.entries
    }

    pub fn last_index(&self) -> Index {
        self.slice.last_index()
    }

    /// Checks that the slice is well-formed, and that no entry is newer than the leader term.
    pub fn valid(&self) -> Result<(), Inconsistency> {
        self.slice.valid()?;
        let last = self.slice.last_entry_id();
        if last.term > self.term {
            return Err(Inconsistency::MalformedSlice {
                prev: self.slice.prev,
                next: last,
            });
        }
        Ok(())
    }
}

/// Total size of the given entries.
pub(crate) fn ents_size(ents: &[Entry]) -> u64 {
    ents.iter().fold(0u64, |size, e| size.saturating_add(e.size()))
}

/// Longest prefix of `ents` whose total size does not exceed `max_size`. The first entry is always
/// included, even when it alone is over the limit.
pub(crate) fn limit_size(ents: &[Entry], max_size: u64) -> &[Entry] {
    let first = match ents.first() {
        Some(first) => first,
        None => return ents,
    };
    let mut size = first.size();
    for (limit, entry) in ents.iter().enumerate().skip(1) {
        size = size.saturating_add(entry.size());
        if size > max_size {
            return &ents[..limit];
        }
    }
    ents
}
