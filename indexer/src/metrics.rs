//! Pipeline counters.
//!
//! Plain atomic counters sampled into an owned snapshot for logging. The
//! orchestrator increments them inline; nothing here blocks or allocates on
//! the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters covering the fetch/process/load pipeline.
#[derive(Debug, Default)]
pub struct IndexerMetrics {
    events_fetched: AtomicU64,
    events_processed: AtomicU64,
    events_skipped: AtomicU64,
    events_failed: AtomicU64,
    changesets_applied: AtomicU64,
    fetch_errors: AtomicU64,
    checkpoint_saves: AtomicU64,
}

/// Point-in-time copy of [`IndexerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Events delivered by the fetcher.
    pub events_fetched: u64,
    /// Events fully processed and checkpointed.
    pub events_processed: u64,
    /// Events dropped as expected (unsupported strategy/event).
    pub events_skipped: u64,
    /// Events that failed processing or loading.
    pub events_failed: u64,
    /// Changesets applied to the repository.
    pub changesets_applied: u64,
    /// Failed fetch attempts.
    pub fetch_errors: u64,
    /// Checkpoint writes.
    pub checkpoint_saves: u64,
}

impl IndexerMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records fetched events.
    pub fn record_fetched(&self, count: u64) {
        self.events_fetched.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one fully-processed event.
    pub fn record_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one skipped event.
    pub fn record_skipped(&self) {
        self.events_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one failed event.
    pub fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records applied changesets.
    pub fn record_changesets(&self, count: u64) {
        self.changesets_applied.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one failed fetch attempt.
    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one checkpoint write.
    pub fn record_checkpoint_save(&self) {
        self.checkpoint_saves.fetch_add(1, Ordering::Relaxed);
    }

    /// Samples all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_fetched: self.events_fetched.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            changesets_applied: self.changesets_applied.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            checkpoint_saves: self.checkpoint_saves.load(Ordering::Relaxed),
        }
    }
}
