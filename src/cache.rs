//! Bounded LIFO store of idle builders.
//!
//! The original design kept softly-reachable entries that the collector
//! could reclaim under memory pressure. Without that facility the cache is
//! a strictly bounded, fully deterministic free-list: at most `capacity`
//! idle builders, most-recently-returned first. Callers must still treat a
//! pop as fallible and fall back to the factory; the miss path is the same
//! whether the cache is empty or an entry was dropped.

use std::collections::VecDeque;

use crate::engine::DocumentBuilder;

/// LIFO free-list of idle [`DocumentBuilder`]s, bounded at push time.
///
/// Not internally synchronized; the pool serializes access through its
/// cache mutex.
#[derive(Debug)]
pub(crate) struct IdleCache {
    entries: VecDeque<DocumentBuilder>,
    capacity: usize,
}

impl IdleCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pops the most recently returned builder, if any.
    pub(crate) fn pop(&mut self) -> Option<DocumentBuilder> {
        self.entries.pop_back()
    }

    /// Inserts `builder` iff the cache is under capacity. Returns whether it
    /// was kept; otherwise the builder is dropped by the caller's scope.
    pub(crate) fn push(&mut self, builder: DocumentBuilder) -> bool {
        if self.entries.len() < self.capacity {
            self.entries.push_back(builder);
            true
        } else {
            false
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
