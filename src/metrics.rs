//! Lightweight counters for the worker loop.
//!
//! No particular metrics backend (Prometheus, OpenTelemetry, …) is wired up
//! here — exporting these is an outer-surface concern. `Metrics` just gives
//! an embedding application something to scrape or log periodically.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    changes_processed: AtomicU64,
    changes_failed: AtomicU64,
    stale_changes_observed: AtomicU64,
}

/// Point-in-time read of a [`Metrics`] instance's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub changes_processed: u64,
    pub changes_failed: u64,
    pub stale_changes_observed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.changes_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.changes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale_changes_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            changes_processed: self.changes_processed.load(Ordering::Relaxed),
            changes_failed: self.changes_failed.load(Ordering::Relaxed),
            stale_changes_observed: self.stale_changes_observed.load(Ordering::Relaxed),
        }
    }
}
