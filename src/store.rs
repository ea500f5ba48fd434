// src/store.rs
//
// Single-slot latest-value store.
//
// Holds the most recent decoded reading as the bit pattern of an f64 in one
// atomic word, so a load always observes a complete value and neither side
// ever waits on the other. The slot is seeded with NaN, which readers treat
// as "no reading yet".

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel stored before the first successful decode.
pub const UNKNOWN_READING: f64 = f64::NAN;

#[derive(Debug)]
pub struct LatestValueStore {
    bits: AtomicU64,
    writes: AtomicU64,
}

impl Default for LatestValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestValueStore {
    /// Create a store seeded with the "unknown" sentinel.
    pub fn new() -> Self {
        Self::with_default(UNKNOWN_READING)
    }

    /// Create a store seeded with an explicit default reading.
    /// The seed does not count as a write.
    pub fn with_default(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
            writes: AtomicU64::new(0),
        }
    }

    /// Replace the current reading (last write wins).
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
        self.writes.fetch_add(1, Ordering::AcqRel);
    }

    /// Current reading, or NaN when nothing valid has arrived yet.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Current reading, with the sentinel mapped to `None`.
    pub fn get(&self) -> Option<f64> {
        let value = self.load();
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    /// Number of completed `store` calls since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }
}
