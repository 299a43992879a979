use bytes::Bytes;
use std::fmt;

/// Index is the position of an entry in the log. The first entry ever written is at index 1;
/// index 0 is the empty log.
pub type Index = u64;

/// Term is the leader term that created an entry.
pub type Term = u64;

/// A single replicated command.
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    pub term: Term,
    pub index: Index,
    pub data: Bytes,
}

impl Entry {
    pub fn new(term: Term, index: Index, data: impl Into<Bytes>) -> Self {
        Entry {
            term,
            index,
            data: data.into(),
        }
    }

    /// Size of the entry as accounted by byte-limited reads. This is the payload length.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn id(&self) -> EntryId {
        EntryId::new(self.term, self.index)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}B)", self.term, self.index, self.data.len())
    }
}

/// EntryId identifies an entry in the log: its position, and the term of the leader that wrote it.
/// Two logs holding the same EntryId are identical up to and including that entry.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryId {
    pub term: Term,
    pub index: Index,
}

impl EntryId {
    pub const fn new(term: Term, index: Index) -> Self {
        EntryId { term, index }
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.term, self.index)
    }
}

/// LogMark is a position in the log of a particular leader. `index` is an entry index in the log
/// of the `term` leader.
///
/// Used to report durability (`stable_to`) and commit (`commit_to`) progress, so that a report
/// made against an old leader's log is recognizable as such.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LogMark {
    pub term: Term,
    pub index: Index,
}

impl LogMark {
    pub const fn new(term: Term, index: Index) -> Self {
        LogMark { term, index }
    }
}

/// LogSpan is the `(after, last]` interval of log indices.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSpan {
    pub after: Index,
    pub last: Index,
}

impl LogSpan {
    pub const fn new(after: Index, last: Index) -> Self {
        LogSpan { after, last }
    }

    pub fn is_empty(&self) -> bool {
        self.after >= self.last
    }

    pub fn len(&self) -> u64 {
        self.last.saturating_sub(self.after)
    }
}
