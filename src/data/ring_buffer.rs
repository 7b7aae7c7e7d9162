//! Lock-free fixed-capacity ring of `f64` rows.
//!
//! Designed for one writer (the acquisition thread) and any number of readers
//! (command dispatcher, exporters, rendering).
//!
//! # Features
//! - No locks on either side; values are stored as `AtomicU64` bit patterns
//! - Allocated once, never resized; `clear` only moves the readable floor
//! - Readers only ever return fully written rows
//!
//! # Layout
//! ```text
//! slots = capacity + 1
//!
//! row index i (monotonic) lives in slot i % slots
//! written: AtomicU64   rows ever published
//! floor:   AtomicU64   first row index visible after the last clear
//! ```
//!
//! The spare slot means the row currently being written never aliases a row
//! inside the readable window `[written - capacity, written)`. A reader copies
//! the window, then re-reads `written` and drops every row that a concurrent
//! writer may have started to overwrite in the meantime.

use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Fixed-capacity ring of `W`-lane rows.
///
/// # Safety of concurrent use
/// `push` and `clear` must only be called from one thread at a time. Reads are
/// safe from any thread concurrently with the writer.
pub struct AtomicRing<const W: usize> {
    cells: Box<[[AtomicU64; W]]>,
    capacity: usize,
    written: AtomicU64,
    floor: AtomicU64,
}

impl<const W: usize> std::fmt::Debug for AtomicRing<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicRing")
            .field("lanes", &W)
            .field("capacity", &self.capacity)
            .field("written", &self.written())
            .field("len", &self.len())
            .finish()
    }
}

impl<const W: usize> AtomicRing<W> {
    /// Allocate a ring that keeps the most recent `capacity` rows.
    ///
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let cells = (0..capacity + 1)
            .map(|_| std::array::from_fn(|_| AtomicU64::new(0)))
            .collect();
        Self {
            cells,
            capacity,
            written: AtomicU64::new(0),
            floor: AtomicU64::new(0),
        }
    }

    /// Maximum number of readable rows.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows published since creation (clears do not reset this).
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Slot the next row will be written to.
    ///
    /// Slots are numbered over `capacity + 1` (the spare slot included), so
    /// `head` wraps at `capacity + 1`, not at `capacity`.
    pub fn head(&self) -> usize {
        (self.written() % self.cells.len() as u64) as usize
    }

    /// Number of readable rows, saturating at `capacity`.
    pub fn len(&self) -> usize {
        let (start, end) = self.window();
        (end - start) as usize
    }

    /// Whether no row is readable.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one row, overwriting the oldest once full. Writer only.
    pub fn push(&self, row: [f64; W]) {
        let index = self.written.load(Ordering::Relaxed);
        let slot = &self.cells[(index % self.cells.len() as u64) as usize];

        // Pairs with the reader's acquire fence: a reader that observes any of
        // these stores also observes `written >= index`.
        fence(Ordering::Release);
        for (cell, value) in slot.iter().zip(row) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
        self.written.store(index + 1, Ordering::Release);
    }

    /// Forget all rows without touching memory. Writer only.
    pub fn clear(&self) {
        let written = self.written.load(Ordering::Relaxed);
        self.floor.store(written, Ordering::Release);
    }

    /// Copy the most recent `count` rows (fewer if fewer are readable), oldest first.
    pub fn read_last(&self, count: usize) -> Vec<[f64; W]> {
        let (floor, end) = self.window();
        let start = floor.max(end.saturating_sub(count as u64));

        let mut rows: Vec<[f64; W]> = (start..end).map(|index| self.load_row(index)).collect();

        fence(Ordering::Acquire);
        let now = self.written.load(Ordering::Relaxed);
        // Row `now` may be in flight and overwrites row `now - capacity - 1`.
        let valid_from = now.saturating_sub(self.capacity as u64);
        let stale = valid_from.saturating_sub(start).min(rows.len() as u64) as usize;
        rows.drain(..stale);
        rows
    }

    /// Copy every readable row, oldest first.
    pub fn read_all(&self) -> Vec<[f64; W]> {
        self.read_last(self.capacity)
    }

    /// Most recent row, if any.
    pub fn last(&self) -> Option<[f64; W]> {
        self.read_last(1).pop()
    }

    /// Readable index range `[start, end)`.
    fn window(&self) -> (u64, u64) {
        let end = self.written.load(Ordering::Acquire);
        let floor = self.floor.load(Ordering::Acquire).min(end);
        (floor.max(end.saturating_sub(self.capacity as u64)), end)
    }

    fn load_row(&self, index: u64) -> [f64; W] {
        let slot = &self.cells[(index % self.cells.len() as u64) as usize];
        std::array::from_fn(|lane| f64::from_bits(slot[lane].load(Ordering::Relaxed)))
    }
}
