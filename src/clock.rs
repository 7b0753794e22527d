//! Scheduler clock
//!
//! Wall-clock milliseconds captured once at start-up, advanced by the tokio
//! monotonic clock. Ages computed from it never go backwards, and under a
//! paused tokio runtime the batch pass and the per-request timers see the
//! same time.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::core_types::TimestampMs;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    base_ms: TimestampMs,
    origin: Instant,
}

impl Clock {
    /// Start a clock at the current wall-clock time
    pub fn new() -> Self {
        let base_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::starting_at(base_ms)
    }

    /// Start a clock at an explicit base, used by tests and replays
    pub fn starting_at(base_ms: TimestampMs) -> Self {
        Self {
            base_ms,
            origin: Instant::now(),
        }
    }

    #[inline]
    pub fn now_ms(&self) -> TimestampMs {
        self.base_ms + self.origin.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_paused_runtime() {
        let clock = Clock::starting_at(10_000);
        assert_eq!(clock.now_ms(), 10_000);

        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_ms(), 12_500);
    }

    #[test]
    fn test_wall_clock_base_is_recent() {
        // 2020-01-01 in ms
        assert!(Clock::new().now_ms() > 1_577_836_800_000);
    }
}
