//! Operation counters for the map.
//!
//! Counters are updated with relaxed atomics on every operation and are
//! observational only; they never affect map behavior. `promotions` counts
//! overlay-to-snapshot promotions, which is the cheapest way for tests and
//! callers to see the amortization machinery at work.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of map-level metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub promotions: u64,
}

/// Internal atomic counters backing [`MapMetrics`].
#[derive(Debug, Default)]
pub(crate) struct MapCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    promotions: AtomicU64,
}

impl MapCounters {
    /// Snapshot current metrics.
    pub(crate) fn snapshot(&self) -> MapMetrics {
        MapMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }

    /// Increment hit counter.
    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment miss counter.
    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment insert counter.
    pub(crate) fn inc_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment update counter.
    pub(crate) fn inc_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment remove counter.
    pub(crate) fn inc_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment promotion counter.
    pub(crate) fn inc_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }
}
