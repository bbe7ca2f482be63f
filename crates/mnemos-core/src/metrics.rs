//! Global atomic counters for the memory layer.
//!
//! Counters are bumped at the call site; [`Metrics::flush`] emits them as a
//! single `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    recalls: AtomicU64,
    dataset_search_failures: AtomicU64,
    memories_stored: AtomicU64,
    consolidations: AtomicU64,
    reflections: AtomicU64,
    entries_pruned: AtomicU64,
    persist_failures: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub recalls: u64,
    pub dataset_search_failures: u64,
    pub memories_stored: u64,
    pub consolidations: u64,
    pub reflections: u64,
    pub entries_pruned: u64,
    pub persist_failures: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            recalls: AtomicU64::new(0),
            dataset_search_failures: AtomicU64::new(0),
            memories_stored: AtomicU64::new(0),
            consolidations: AtomicU64::new(0),
            reflections: AtomicU64::new(0),
            entries_pruned: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_recalls(&self) {
        self.recalls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "recalls", "counter incremented");
    }

    pub fn inc_dataset_search_failures(&self) {
        self.dataset_search_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dataset_search_failures", "counter incremented");
    }

    pub fn add_memories_stored(&self, n: u64) {
        self.memories_stored.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "memories_stored", by = n, "counter incremented");
    }

    pub fn inc_consolidations(&self) {
        self.consolidations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "consolidations", "counter incremented");
    }

    pub fn inc_reflections(&self) {
        self.reflections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reflections", "counter incremented");
    }

    pub fn add_entries_pruned(&self, n: u64) {
        self.entries_pruned.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "entries_pruned", by = n, "counter incremented");
    }

    pub fn inc_persist_failures(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "persist_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            recalls: self.recalls.load(Ordering::Relaxed),
            dataset_search_failures: self.dataset_search_failures.load(Ordering::Relaxed),
            memories_stored: self.memories_stored.load(Ordering::Relaxed),
            consolidations: self.consolidations.load(Ordering::Relaxed),
            reflections: self.reflections.load(Ordering::Relaxed),
            entries_pruned: self.entries_pruned.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            recalls = s.recalls,
            dataset_search_failures = s.dataset_search_failures,
            memories_stored = s.memories_stored,
            consolidations = s.consolidations,
            reflections = s.reflections,
            entries_pruned = s.entries_pruned,
            persist_failures = s.persist_failures,
        );
    }

    /// Reset all counters to zero (tests only).
    pub fn reset(&self) {
        self.recalls.store(0, Ordering::Relaxed);
        self.dataset_search_failures.store(0, Ordering::Relaxed);
        self.memories_stored.store(0, Ordering::Relaxed);
        self.consolidations.store(0, Ordering::Relaxed);
        self.reflections.store(0, Ordering::Relaxed);
        self.entries_pruned.store(0, Ordering::Relaxed);
        self.persist_failures.store(0, Ordering::Relaxed);
    }
}
