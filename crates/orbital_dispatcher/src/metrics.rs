//! Per-tick assignment counters (§4.4 L1 step 5).
//!
//! Deliberately minimal: a running total plus the most recent tick's
//! breakdown, logged via `tracing` rather than exported to a metrics
//! backend — the HTTP/monitoring surface that would scrape these is out of
//! scope (§1).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TickMetrics {
    pub attempted: AtomicU64,
    pub succeeded: AtomicU64,
    pub skipped: AtomicU64,
}

impl TickMetrics {
    pub fn record(&self, attempted: u64, succeeded: u64, skipped: u64) {
        self.attempted.fetch_add(attempted, Ordering::Relaxed);
        self.succeeded.fetch_add(succeeded, Ordering::Relaxed);
        self.skipped.fetch_add(skipped, Ordering::Relaxed);
        tracing::debug!(
            attempted,
            succeeded,
            skipped,
            total_attempted = self.attempted.load(Ordering::Relaxed),
            total_succeeded = self.succeeded.load(Ordering::Relaxed),
            total_skipped = self.skipped.load(Ordering::Relaxed),
            "tick complete"
        );
    }
}
