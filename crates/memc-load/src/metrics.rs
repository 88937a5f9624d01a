//! Run-wide counters shared by readers and workers
//!
//! Updated with relaxed fetch-adds from every task. The supervisor only
//! trusts the totals after joining all tasks, which orders every update
//! before the final read.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic pipeline counters
#[derive(Debug, Default)]
pub struct Counters {
    lines: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A non-empty line was read and is about to enter the line queue
    pub fn record_line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`record_line`](Self::record_line) for a line the queue refused
    pub fn retract_line(&self) {
        self.lines.fetch_sub(1, Ordering::Relaxed);
    }

    /// A job was stored by its backend
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A line or job was dropped
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Lines read but not yet settled as processed or failed
    ///
    /// Reads `lines` first, so a concurrent snapshot can only under-count.
    pub fn in_flight(&self) -> u64 {
        let lines = self.lines();
        lines.saturating_sub(self.processed() + self.errors())
    }

    pub fn snapshot(&self) -> Totals {
        Totals {
            lines: self.lines(),
            processed: self.processed(),
            errors: self.errors(),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub lines: u64,
    pub processed: u64,
    pub errors: u64,
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Processed: {}, Errors: {}", self.processed, self.errors)
    }
}
