//! Lock-free statistics accumulation
//!
//! Workers add signed deltas here; the main thread periodically drains
//! the pending amounts and forwards them to the external callback. The
//! counters hold *pending deltas not yet handed over*, never totals.

use std::sync::atomic::{AtomicI64, Ordering};

/// Pending processed/total deltas, multi-writer lock-free.
#[derive(Debug, Default)]
pub struct StatDeltas {
    items_processed: AtomicI64,
    bytes_processed: AtomicI64,
    items_total: AtomicI64,
    bytes_total: AtomicI64,
}

impl StatDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the pending processed deltas. Never blocks, never fails.
    pub fn add_processed(&self, items_delta: i64, bytes_delta: i64) {
        self.items_processed.fetch_add(items_delta, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes_delta, Ordering::Relaxed);
    }

    /// Add to the pending total deltas. Deltas may be negative.
    pub fn add_total(&self, items_delta: i64, bytes_delta: i64) {
        self.items_total.fetch_add(items_delta, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes_delta, Ordering::Relaxed);
    }

    /// Take the pending processed deltas.
    pub fn drain_processed(&self) -> (i64, i64) {
        (
            drain(&self.items_processed),
            drain(&self.bytes_processed),
        )
    }

    /// Take the pending total deltas.
    pub fn drain_total(&self) -> (i64, i64) {
        (drain(&self.items_total), drain(&self.bytes_total))
    }
}

/// Read the pending amount and subtract exactly that amount back.
///
/// Two atomic steps, not a store of zero: increments racing in between
/// the load and the subtraction stay pending for the next drain.
fn drain(counter: &AtomicI64) -> i64 {
    let pending = counter.load(Ordering::Relaxed);
    if pending != 0 {
        counter.fetch_sub(pending, Ordering::Relaxed);
    }
    pending
}
