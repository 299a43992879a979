use crate::types::{EntryId, Index, LogSlice, Term};
use std::collections::VecDeque;

/// TermCache remembers where terms change in a suffix of the log, so that term lookups in the
/// recent (possibly stable) part of the log don't go to storage.
///
/// Each cached EntryId is the first entry of its term within the covered suffix; the last one's
/// term extends to the end of the log. The first cached entry marks the start of coverage. Only a
/// bounded number of term flips is kept; the oldest ones are evicted.
///
/// It's just a cache. Every answer it gives must agree with the log itself.
#[derive(Clone, Debug)]
pub(crate) struct TermCache {
    cache: VecDeque<EntryId>,
    max_size: usize,
}

impl TermCache {
    /// Creates a cache covering only the `last` entry of the log.
    pub(crate) fn new(max_size: usize, last: EntryId) -> Self {
        let mut cache = VecDeque::with_capacity(max_size);
        cache.push_back(last);
        TermCache { cache, max_size }
    }

    pub(crate) fn reset(&mut self, last: EntryId) {
        self.cache.clear();
        self.cache.push_back(last);
    }

    /// Updates the cache after the log was truncated at `slice.prev` and the slice's entries were
    /// appended.
    pub(crate) fn truncate_and_append(&mut self, slice: &LogSlice) {
        self.truncate_to(slice.prev);
        for entry in &slice.entries {
            self.push(entry.id());
        }
    }

    /// Term of the entry at `index`, if the cache covers it. The caller makes sure `index` does
    /// not exceed the last index of the log.
    pub(crate) fn term(&self, index: Index) -> Option<Term> {
        match self.cache.front() {
            Some(first) if index >= first.index => {}
            _ => return None,
        }
        self.cache.iter().rev().find(|id| id.index <= index).map(|id| id.term)
    }

    fn truncate_to(&mut self, prev: EntryId) {
        while matches!(self.cache.back(), Some(id) if id.index > prev.index) {
            self.cache.pop_back();
        }
        match self.cache.back() {
            Some(id) if id.term == prev.term => {}
            // Either nothing is left, or prev's term started at an unknown index after the last
            // cached flip. Restart coverage at prev.
            _ => self.reset(prev),
        }
    }

    fn push(&mut self, id: EntryId) {
        if matches!(self.cache.back(), Some(last) if last.term == id.term) {
            return;
        }
        if self.cache.len() == self.max_size {
            self.cache.pop_front();
        }
        self.cache.push_back(id);
    }
}
