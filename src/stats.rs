//! Scheduler counters
//!
//! Written only by the scheduler actor, read from anywhere through a
//! snapshot. Relaxed ordering is enough: counters are reporting, not
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Admitted join requests
    pub joins: AtomicU64,
    /// Joins refused as duplicate sessions
    pub duplicates: AtomicU64,
    /// Effective cancellations
    pub cancels: AtomicU64,
    /// Pairs produced
    pub matches: AtomicU64,
    /// Requests purged as expired by a pass
    pub expired: AtomicU64,
    /// Requests republished by a pass
    pub requeued: AtomicU64,
    /// Non-empty passes run
    pub passes: AtomicU64,
    /// Batch entries dropped as cancelled or stale
    pub dropped: AtomicU64,
    /// Intake publish failures (admission or re-queue)
    pub publish_failures: AtomicU64,
    /// Intake entries released by checkpoints
    pub released: AtomicU64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            joins: self.joins.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            cancels: self.cancels.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of stats (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStatsSnapshot {
    pub joins: u64,
    pub duplicates: u64,
    pub cancels: u64,
    pub matches: u64,
    pub expired: u64,
    pub requeued: u64,
    pub passes: u64,
    pub dropped: u64,
    pub publish_failures: u64,
    pub released: u64,
}

impl std::fmt::Display for SchedulerStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scheduler Stats: joins={} (dup={}), cancels={}, pairs={}, expired={}, requeued={}, passes={}, dropped={}, publish_failures={}, released={}",
            self.joins,
            self.duplicates,
            self.cancels,
            self.matches,
            self.expired,
            self.requeued,
            self.passes,
            self.dropped,
            self.publish_failures,
            self.released
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = SchedulerStats::new();
        SchedulerStats::incr(&stats.joins);
        SchedulerStats::incr(&stats.joins);
        SchedulerStats::add(&stats.requeued, 5);

        let snap = stats.snapshot();
        assert_eq!(snap.joins, 2);
        assert_eq!(snap.requeued, 5);
        assert_eq!(snap.matches, 0);
        assert!(snap.to_string().starts_with("Scheduler Stats: joins=2"));
    }
}
