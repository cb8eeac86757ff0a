//! Bounded append-only history shared by the confirmation coordinator and the
//! escalation auditor.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Default number of entries kept before the oldest are dropped.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Thread-safe, bounded, append-only log.
///
/// Readers get a cloned snapshot taken under the lock, so they never observe a
/// partially appended entry.
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: Mutex<VecDeque<T>>,
    max_len: usize,
}

impl<T: Clone> BoundedLog<T> {
    /// Create a log that keeps at most `max_len` entries (at least one).
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_len: max_len.max(1),
        }
    }

    /// Append an entry, dropping the oldest one when at capacity.
    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_len {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.with_entries(|entries| entries.to_vec())
    }

    /// Run `f` over the entries while holding the lock.
    pub fn with_entries<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(entries.make_contiguous())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_len
    }
}

impl<T: Clone> Default for BoundedLog<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
