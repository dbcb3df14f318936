//! Delta batching
//!
//! Rapid single deltas are collected here and flushed into the book as one
//! batch per interval, bounding the update frequency seen by observers.

use crate::protocol::BookEntry;

/// Accumulates deltas between flush ticks
#[derive(Debug, Default)]
pub struct DeltaBuffer {
    entries: Vec<BookEntry>,
}

impl DeltaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: BookEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the buffered batch, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<BookEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Discard buffered deltas; called on resync so stale entries never
    /// reach a freshly seeded book.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
