use crate::raftlog::log_snapshot::LogSnapshot;
use crate::raftlog::options::{RaftLogOptions, RaftLogOptionsValidated};
use crate::raftlog::term_cache::TermCache;
use crate::raftlog::unstable::Unstable;
use crate::raftlog::{Inconsistency, LogCreationError, LogError};
use crate::storage::Storage;
use crate::types::{
    Entry, EntryId, Index, LeadSlice, LeaderSnapshot, LogMark, LogSpan, Snapshot, Term, NO_LIMIT,
};
use std::cell::Cell;
use std::convert::TryFrom;
use std::fmt;
use std::marker::PhantomData;

/// RaftLog is the log of a single raft instance: the durable entries in `storage`, followed by the
/// in-memory `unstable` tail.
///
/// Note: A log entry moves through these states (not modeled directly in code):
/// 1. Unstable - appended to memory, maybe being written
/// 2. Stable - written to storage, not necessarily replicated to a quorum
/// 3. Committed - known to be durable on a quorum
/// 4. Applying - handed to the state machine
/// 5. Applied - the state machine confirmed it
///
/// Only unstable, uncommitted entries can be overwritten.
///
/// All mutations are driven by the owning raft instance, one at a time. RaftLog is deliberately
/// not `Sync`; concurrent readers take a [`LogSnapshot`] instead.
pub struct RaftLog<S: Storage> {
    // All stable entries since the last snapshot.
    storage: S,
    // All unstable entries and the incoming snapshot. They will be saved into storage.
    unstable: Unstable,
    // A suffix of the log (both stable and unstable) used for term lookups.
    term_cache: TermCache,

    // The highest log position known to be in stable storage on a quorum of nodes.
    //
    // Invariant: committed does not regress.
    committed: Index,
    // The highest log position the application has been instructed to apply. Some of these
    // entries may still be applying.
    //
    // Invariant: applied <= applying <= committed.
    // Invariant: applying does not regress.
    applying: Index,
    // The highest log position the application has applied to its state machine.
    //
    // Invariant: applied <= committed.
    // Invariant: applied does not regress.
    applied: Index,

    max_committed_size_per_ready: u64,
    logger: slog::Logger,
    _not_sync: PhantomData<Cell<()>>,
}

impl<S: Storage> RaftLog<S> {
    /// Creates a log initialized to the state in the given storage, with default options.
    pub fn new(storage: S, logger: slog::Logger) -> Result<Self, LogCreationError> {
        Self::with_options(storage, RaftLogOptions::default(), logger)
    }

    pub fn with_options(
        storage: S,
        options: RaftLogOptions,
        logger: slog::Logger,
    ) -> Result<Self, LogCreationError> {
        let options = RaftLogOptionsValidated::try_from(options)
            .map_err(|e| LogCreationError::IllegalOptions(e.to_string()))?;

        let compacted = storage.compacted();
        let last_index = storage.last_index();
        let last_term = storage.term(last_index)?;
        let last = EntryId::new(last_term, last_index);

        Ok(RaftLog {
            storage,
            unstable: Unstable::new(last, logger.clone()),
            term_cache: TermCache::new(options.term_cache_size, last),
            // Committed and applied pointers start at the compaction point. The owner moves
            // `applied` forward once it knows how far its state machine got.
            committed: compacted,
            applying: compacted,
            applied: compacted,
            max_committed_size_per_ready: options.max_committed_size_per_ready,
            logger,
            _not_sync: PhantomData,
        })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable access to storage, for persisting entries handed out by `next_unstable_ents`.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn committed(&self) -> Index {
        self.committed
    }

    pub fn applying(&self) -> Index {
        self.applying
    }

    pub fn applied(&self) -> Index {
        self.applied
    }

    /// The term of the leader whose append was accepted into the log last. A rejected append does
    /// not update it.
    ///
    /// Invariant: the log is a prefix of the acc_term leader's log.
    /// Invariant: last_entry_id().term <= acc_term.
    pub fn acc_term(&self) -> Term {
        self.unstable.acc_term()
    }

    /// Conditionally appends the slice to the log, making the log consistent with the `a.term`
    /// leader's log up to `a.last_index()`. The prefix of the slice that is already in the log is
    /// skipped, and only the missing suffix is appended, possibly after truncating a conflicting
    /// suffix of the log.
    ///
    /// Returns false if `a.prev()` does not match the log, the slice would leave a gap, `a.term`
    /// is stale, or the truncation would discard entries being written.
    pub fn maybe_append(&mut self, mut a: LeadSlice) -> Result<bool, LogError> {
        self.check_slice(&a)?;
        let matched = match self.match_slice(&a)? {
            Some(matched) => matched,
            None => return Ok(false),
        };
        // a.prev().index <= matched <= a.last_index(), so this is safe.
        a.slice.forward(matched);

        let first = match a.entries().first() {
            Some(first) => first.index,
            // Everything already matches.
            None => return Ok(true),
        };
        if first <= self.committed {
            let e = Inconsistency::OverwriteCommitted {
                index: first,
                committed: self.committed,
            };
            slog::crit!(self.logger, "{}", e);
            return Err(e.into());
        }

        // The cache is only updated once the unstable log has taken the slice.
        let appended = a.slice.clone();
        if !self.unstable.truncate_and_append(a) {
            return Ok(false);
        }
        self.term_cache.truncate_and_append(&appended);
        Ok(true)
    }

    /// Appends the slice to the end of the log. Returns false if `a.prev()` is not the last entry
    /// of the log, or `a.term` is stale.
    pub fn append(&mut self, a: LeadSlice) -> Result<bool, Inconsistency> {
        self.check_slice(&a)?;
        let appended = a.slice.clone();
        if !self.unstable.append(a) {
            return Ok(false);
        }
        self.term_cache.truncate_and_append(&appended);
        Ok(true)
    }

    /// Finds the longest prefix of the slice that is already in the log.
    ///
    /// Returns the index of the last matching entry, in `[s.prev().index, s.last_index()]`. The
    /// entry after it either mismatches or is missing. Returns None if `s.prev()` does not match
    /// or is missing; the slice can't be used to repair this log then.
    pub fn match_slice(&self, s: &LeadSlice) -> Result<Option<Index>, LogError> {
        if !self.match_term(s.prev())? {
            return Ok(None);
        }

        // Logs that diverge at some index diverge at all indices above it, so the scan stops at
        // the first mismatch.
        let mut matched = s.prev().index;
        for entry in s.entries() {
            let id = entry.id();
            if self.match_term(id)? {
                matched = id.index;
                continue;
            }
            if id.index <= self.last_index() {
                let existing = self.zero_term_on_out_of_bounds(self.term(id.index))?;
                slog::info!(
                    self.logger,
                    "found conflict at index {} [existing term: {}, conflicting term: {}]",
                    id.index,
                    existing,
                    id.term
                );
            }
            return Ok(Some(matched));
        }
        Ok(Some(matched))
    }

    /// Returns a best guess on where this log ends matching another log, knowing only the
    /// `(index, term)` of a single entry of the other log.
    ///
    /// The returned index is the max `i <= min(index, last_index())` such that `term(i) <= term`,
    /// or `term(i)` is unknown because `i` is compacted. The returned term is `term(i)`, or 0 if
    /// unknown. `(0, 0)` means no such index exists.
    ///
    /// Used after a rejected append to pick the next repair attempt without transferring the whole
    /// conflicting log.
    pub fn find_conflict_by_term(&self, index: Index, term: Term) -> Result<(Index, Term), LogError> {
        // Entry terms in a log are monotonic. The other log having (index, term) means it has
        // term(i) <= term for all i <= index. In our log, for i <= min(index, last_index):
        //  1. term(i) > term: the logs definitely mismatch at indices >= i;
        //  2. term(i) == term: the logs definitely match at indices <= i;
        //  3. term(i) < term: the logs may or may not match at indices <= i;
        //  4. term(i) unknown: the logs may or may not match at indices <= i.
        // Find the highest index for which one of 2-4 holds.
        let mut i = index.min(self.last_index());
        while i > 0 {
            match self.term(i) {
                Ok(our_term) if our_term <= term => return Ok((i, our_term)),
                Ok(_) => {}
                // Assume a possible match, with an unknown term.
                Err(LogError::Compacted) | Err(LogError::Unavailable) => return Ok((i, 0)),
                Err(e) => return Err(e),
            }
            i -= 1;
        }
        Ok((0, 0))
    }

    /// Entries ready to be written to storage, that are not already being written.
    pub fn next_unstable_ents(&self) -> &[Entry] {
        self.unstable.next_entries()
    }

    pub fn has_next_unstable_ents(&self) -> bool {
        !self.next_unstable_ents().is_empty()
    }

    /// The snapshot, if there is one ready to be written to storage that is not already being
    /// written.
    pub fn next_unstable_snapshot(&self) -> Option<&Snapshot> {
        self.unstable.next_snapshot()
    }

    pub fn has_next_unstable_snapshot(&self) -> bool {
        self.unstable.next_snapshot().is_some()
    }

    /// True if there is a snapshot waiting to be written, or being written.
    pub fn has_next_or_in_progress_snapshot(&self) -> bool {
        self.unstable.snapshot().is_some()
    }

    /// The next batch of committed entries to apply, limited to `max_committed_size_per_ready`
    /// bytes (at least one entry if any is appliable).
    ///
    /// Committed entries can be handed out before they are durable locally. With `allow_unstable`
    /// false, only entries already in storage are returned.
    pub fn next_committed_ents(&self, allow_unstable: bool) -> Result<Vec<Entry>, LogError> {
        let span = self.next_committed_span(allow_unstable);
        if span.is_empty() {
            return Ok(Vec::new());
        }
        self.snap()
            .slice(span.after, span.last, self.max_committed_size_per_ready)
    }

    /// The span of committed entries that can be applied next. Cheap, no entries are read.
    pub fn next_committed_span(&self, allow_unstable: bool) -> LogSpan {
        LogSpan::new(self.applying, self.max_appliable_index(allow_unstable))
    }

    /// The max committed index that can be applied.
    ///
    /// Never regresses, and is always >= applying, as long as `allow_unstable` does not flip from
    /// true to false.
    ///
    /// While there is a pending snapshot this returns `applying`: the snapshot must be applied
    /// before any further entries.
    pub fn max_appliable_index(&self, allow_unstable: bool) -> Index {
        if self.has_next_or_in_progress_snapshot() {
            return self.applying;
        }
        if allow_unstable {
            return self.committed;
        }
        self.committed.min(self.unstable.prev().index)
    }

    /// The pending snapshot, or else the latest snapshot in storage.
    pub fn snapshot(&self) -> Result<Snapshot, LogError> {
        if let Some(snapshot) = self.unstable.snapshot() {
            return Ok(snapshot.clone());
        }
        Ok(self.storage.snapshot()?)
    }

    pub fn compacted(&self) -> Index {
        match self.unstable.maybe_compacted() {
            Some(index) => index,
            None => self.storage.compacted(),
        }
    }

    pub fn last_index(&self) -> Index {
        self.unstable.last_index()
    }

    pub fn last_entry_id(&self) -> EntryId {
        self.unstable.last_entry_id()
    }

    /// Bumps the commit index to `mark.index`, if it is higher.
    pub fn commit_to(&mut self, mark: LogMark) -> Result<(), Inconsistency> {
        // Never decrease commit.
        if self.committed >= mark.index {
            return Ok(());
        }
        let last_index = self.last_index();
        if last_index < mark.index {
            let e = Inconsistency::CommitOutOfRange {
                commit: mark.index,
                last_index,
            };
            slog::crit!(self.logger, "{}", e);
            return Err(e);
        }
        self.committed = mark.index;
        Ok(())
    }

    /// Records that the state machine applied everything up to `i`.
    pub fn applied_to(&mut self, i: Index) -> Result<(), Inconsistency> {
        if self.committed < i || i < self.applied {
            let e = Inconsistency::AppliedOutOfRange {
                applied: i,
                prev_applied: self.applied,
                committed: self.committed,
            };
            slog::crit!(self.logger, "{}", e);
            return Err(e);
        }
        self.applied = i;
        self.applying = self.applying.max(i);
        Ok(())
    }

    /// Records that everything up to `i` was handed to the state machine.
    pub fn accept_applying(&mut self, i: Index) -> Result<(), Inconsistency> {
        if i < self.applying || i > self.committed {
            let e = Inconsistency::ApplyingOutOfRange {
                applying: i,
                prev_applying: self.applying,
                committed: self.committed,
            };
            slog::crit!(self.logger, "{}", e);
            return Err(e);
        }
        self.applying = i;
        Ok(())
    }

    /// Reports that the entries up to `mark` are durable in storage.
    pub fn stable_to(&mut self, mark: LogMark) {
        self.unstable.stable_to(mark)
    }

    /// Reports that the snapshot at index `i` is durable in storage.
    pub fn stable_snap_to(&mut self, i: Index) {
        self.unstable.stable_snap_to(i)
    }

    /// Indicates that the application started writing the current unstable entries (and
    /// snapshot). They won't be returned by `next_unstable_ents` again.
    pub fn accept_unstable(&mut self) {
        self.unstable.accept_in_progress()
    }

    /// Term of the entry at `index`.
    pub fn term(&self, index: Index) -> Result<Term, LogError> {
        self.snap().term(index)
    }

    /// Entries at indices > after, with the total size up to `max_size` (at least one entry).
    /// Empty if there are no entries after `after`.
    pub fn entries(&self, after: Index, max_size: u64) -> Result<Vec<Entry>, LogError> {
        let last_index = self.last_index();
        if after >= last_index {
            return Ok(Vec::new());
        }
        self.slice(after, last_index, max_size)
    }

    /// All entries in the log.
    pub fn all_entries(&self) -> Result<Vec<Entry>, LogError> {
        loop {
            match self.entries(self.compacted(), NO_LIMIT) {
                // Retry if there was a racing compaction.
                Err(LogError::Compacted) => continue,
                res => return res,
            }
        }
    }

    /// True if a log ending with `their` last entry is at least as up-to-date as this one.
    ///
    /// The log with the later last term is more up-to-date. If the last terms are equal, the
    /// longer log is.
    pub fn is_up_to_date(&self, their: EntryId) -> bool {
        let our = self.last_entry_id();
        their.term > our.term || (their.term == our.term && their.index >= our.index)
    }

    pub fn match_term(&self, id: EntryId) -> Result<bool, LogError> {
        match self.term(id.index) {
            Ok(term) => Ok(term == id.term),
            Err(LogError::Compacted) | Err(LogError::Unavailable) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replaces the log with the snapshot. Returns false if the snapshot comes from a stale
    /// leader, or doesn't go beyond the committed index.
    pub fn restore(&mut self, s: LeaderSnapshot) -> bool {
        let id = s.last_entry_id();
        if id.index <= self.committed {
            slog::warn!(
                self.logger,
                "rejecting snapshot at index {}, not past committed({})",
                id.index,
                self.committed
            );
            return false;
        }
        if !self.unstable.restore(s) {
            return false;
        }
        self.term_cache.reset(id);
        self.committed = id.index;
        slog::info!(
            self.logger,
            "log [{}] restored snapshot [index: {}, term: {}]",
            self,
            id.index,
            id.term
        );
        true
    }

    /// Visits the entries in `(lo, hi]` in pages of up to `page_size` bytes. See
    /// [`LogSnapshot::scan`].
    pub fn scan<F, E>(&self, lo: Index, hi: Index, page_size: u64, visit: F) -> Result<(), E>
    where
        F: FnMut(&[Entry]) -> Result<(), E>,
        E: From<LogError>,
    {
        self.snap().scan(lo, hi, page_size, visit)
    }

    /// Returns a prefix of the `(lo, hi]` interval, with the total size up to `max_size`. See
    /// [`LogSnapshot::slice`].
    pub fn slice(&self, lo: Index, hi: Index, max_size: u64) -> Result<Vec<Entry>, LogError> {
        self.snap().slice(lo, hi, max_size)
    }

    /// Returns a point-in-time view of the log. The borrow keeps the log and its storage frozen
    /// for as long as the view is in use.
    pub fn snap(&self) -> LogSnapshot<'_, S> {
        LogSnapshot::new(
            self.compacted(),
            &self.storage,
            &self.unstable.log,
            self.term_cache.clone(),
            self.logger.clone(),
        )
    }

    fn check_slice(&self, a: &LeadSlice) -> Result<(), Inconsistency> {
        a.valid().map_err(|e| {
            slog::crit!(self.logger, "{}", e);
            e
        })
    }

    fn zero_term_on_out_of_bounds(&self, res: Result<Term, LogError>) -> Result<Term, LogError> {
        match res {
            Ok(term) => Ok(term),
            Err(LogError::Compacted) | Err(LogError::Unavailable) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl<S: Storage> fmt::Display for RaftLog<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "committed={}, applied={}, applying={}, unstable.offset={}, unstable.offset_in_progress={}, len(unstable.entries)={}",
            self.committed,
            self.applied,
            self.applying,
            self.unstable.prev().index + 1,
            self.unstable.entry_in_progress() + 1,
            self.unstable.entries().len()
        )
    }
}
