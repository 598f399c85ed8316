//! The shared counter.
//!
//! A single non-negative integer that starts at zero and only ever moves
//! up by one. The atomic cell is the only synchronization it needs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter with atomic read and increment-and-return.
#[derive(Debug, Default)]
pub struct CounterStore {
    value: AtomicU64,
}

impl CounterStore {
    /// Create a counter at zero.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a counter holding `value`.
    pub const fn starting_at(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Add one and return the new value.
    ///
    /// The read-modify-write is a single atomic operation, so concurrent
    /// callers never observe the same pre-increment value.
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}
