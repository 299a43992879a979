use crate::types::{Entry, EntryId, Index, LeadSlice, LeaderSnapshot, LogMark, Snapshot, Term};

/// Unstable is the in-memory tail of the log that has not been durably written yet, plus possibly
/// an incoming snapshot that has not been applied to storage yet.
///
/// The entries form a LeadSlice whose `term` is the accepted leader term (accTerm), and whose
/// `prev` is the last entry known to be in storage (or the snapshot's last entry, if there is a
/// pending snapshot).
///
/// The application persists the tail in two steps: it first accepts the next entries/snapshot as
/// in-progress (`accept_in_progress`), then reports them durable (`stable_to`/`stable_snap_to`).
/// Entries in `(prev.index, entry_in_progress]` are being written and are not handed out again.
pub(crate) struct Unstable {
    // The incoming snapshot, if any.
    snapshot: Option<Snapshot>,
    // True if the snapshot is being written to storage.
    snapshot_in_progress: bool,
    // Unstable entries, as a slice of the accepted leader's log.
    //
    // Invariant: prev.index <= entry_in_progress <= last_index().
    pub(super) log: LeadSlice,
    // Index of the last entry being written to storage.
    entry_in_progress: Index,

    logger: slog::Logger,
}

impl Unstable {
    /// Creates an empty unstable log that follows the `last` durable entry.
    pub(crate) fn new(last: EntryId, logger: slog::Logger) -> Self {
        Unstable {
            snapshot: None,
            snapshot_in_progress: false,
            log: LeadSlice::new(last.term, last, Vec::new()),
            entry_in_progress: last.index,
            logger,
        }
    }

    pub(crate) fn acc_term(&self) -> Term {
        self.log.term
    }

    pub(crate) fn prev(&self) -> EntryId {
        self.log.slice.prev
    }

    pub(crate) fn last_index(&self) -> Index {
        self.log.slice.last_index()
    }

    pub(crate) fn last_entry_id(&self) -> EntryId {
        self.log.slice.last_entry_id()
    }

    pub(crate) fn entry_in_progress(&self) -> Index {
        self.entry_in_progress
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.log.slice.entries
    }

    pub(crate) fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Index of the pending snapshot, which supersedes the compaction point of storage.
    pub(crate) fn maybe_compacted(&self) -> Option<Index> {
        self.snapshot.as_ref().map(|s| s.metadata.index)
    }

    /// Entries that are ready to be written, and are not already being written.
    pub(crate) fn next_entries(&self) -> &[Entry] {
        let in_progress = (self.entry_in_progress - self.prev().index) as usize;
        &self.entries()[in_progress..]
    }

    /// The snapshot, if it is ready to be written and is not already being written.
    pub(crate) fn next_snapshot(&self) -> Option<&Snapshot> {
        if self.snapshot_in_progress {
            return None;
        }
        self.snapshot.as_ref()
    }

    /// Marks all current entries and the snapshot as being written. They won't be returned from
    /// `next_entries`/`next_snapshot` again.
    pub(crate) fn accept_in_progress(&mut self) {
        self.snapshot_in_progress = self.snapshot.is_some();
        self.entry_in_progress = self.last_index();
    }

    /// Drops the prefix of the entries up to `mark`, now that it's durable.
    ///
    /// The mark is ignored if it was issued against another leader's log, or doesn't refer to an
    /// unstable entry. Both can happen when the durability report races with a log change.
    pub(crate) fn stable_to(&mut self, mark: LogMark) {
        if mark.term != self.log.term {
            slog::info!(
                self.logger,
                "mark {:?} is from a different leader term than accepted ({}); ignoring",
                mark,
                self.log.term
            );
            return;
        }
        if matches!(&self.snapshot, Some(s) if s.metadata.index == mark.index) {
            // The index refers to the unstable snapshot, not to an entry.
            slog::info!(self.logger, "entry at index {} matched unstable snapshot; ignoring", mark.index);
            return;
        }
        if mark.index <= self.prev().index || mark.index > self.last_index() {
            slog::info!(self.logger, "entry at index {} missing from unstable log; ignoring", mark.index);
            return;
        }
        self.log.slice.forward(mark.index);
        self.entry_in_progress = self.entry_in_progress.max(mark.index);
        if self.log.slice.entries.is_empty() {
            // Release the buffer; the whole tail is durable.
            self.log.slice.entries = Vec::new();
        }
    }

    /// Drops the snapshot once it's written, if it's still the one at index `i`.
    pub(crate) fn stable_snap_to(&mut self, i: Index) {
        if matches!(&self.snapshot, Some(s) if s.metadata.index == i) {
            self.snapshot = None;
            self.snapshot_in_progress = false;
        }
    }

    /// Replaces the whole unstable log with the snapshot. Returns false if the snapshot is from a
    /// leader older than the accepted one.
    pub(crate) fn restore(&mut self, s: LeaderSnapshot) -> bool {
        if s.term < self.log.term {
            slog::warn!(
                self.logger,
                "rejecting snapshot from stale leader term {} [accepted term: {}]",
                s.term,
                self.log.term
            );
            return false;
        }
        let last = s.last_entry_id();
        self.log = LeadSlice::new(s.term, last, Vec::new());
        self.snapshot = Some(s.snapshot);
        self.snapshot_in_progress = false;
        self.entry_in_progress = last.index;
        true
    }

    /// Appends the slice to the end of the log. Returns false if the slice does not directly follow
    /// the last entry, or comes from a stale leader.
    pub(crate) fn append(&mut self, a: LeadSlice) -> bool {
        if a.term < self.log.term {
            slog::warn!(
                self.logger,
                "rejecting append from stale leader term {} [accepted term: {}]",
                a.term,
                self.log.term
            );
            return false;
        }
        if a.prev() != self.last_entry_id() {
            slog::warn!(
                self.logger,
                "rejecting append after {:?}, not the last entry {:?}",
                a.prev(),
                self.last_entry_id()
            );
            return false;
        }
        self.log.term = a.term;
        self.log.slice.entries.extend(a.slice.entries);
        true
    }

    /// Truncates the log after `a.prev()` and appends the slice entries. The caller has verified
    /// that `a.prev()` matches the log.
    ///
    /// Returns false if the slice comes from a stale leader, would leave a gap, or would discard
    /// entries that are being written right now.
    pub(crate) fn truncate_and_append(&mut self, a: LeadSlice) -> bool {
        if a.term < self.log.term {
            slog::warn!(
                self.logger,
                "rejecting append from stale leader term {} [accepted term: {}]",
                a.term,
                self.log.term
            );
            return false;
        }
        let after = a.prev().index;
        let last = self.last_index();
        if after > last {
            slog::warn!(self.logger, "rejecting append after {}, past the last index {}", after, last);
            return false;
        }
        let prev = self.prev();
        if after < self.entry_in_progress && self.entry_in_progress > prev.index {
            slog::warn!(
                self.logger,
                "rejecting truncation at index {}: entries ({}, {}] are being written",
                after + 1,
                prev.index,
                self.entry_in_progress
            );
            return false;
        }

        if after == last {
            self.log.slice.entries.extend(a.slice.entries);
        } else if after >= prev.index {
            slog::info!(self.logger, "truncate the unstable entries before index {}", after + 1);
            self.log.slice.entries.truncate((after - prev.index) as usize);
            self.log.slice.entries.extend(a.slice.entries);
        } else {
            // The durable log diverges too. Nothing is in flight, so the whole tail is replaced,
            // and storage gets overwritten once the new entries are written.
            slog::info!(self.logger, "replace the unstable entries from index {}", after + 1);
            self.log.slice = a.slice;
            self.entry_in_progress = after;
        }
        self.log.term = a.term;
        true
    }
}
