//! Synthetic workload - seeded users joining, some leaving early
//!
//! Deterministic for a given seed: the same users, interests and timings are
//! generated every run, so outcome tallies can be compared across builds.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::core_types::TopicId;
use crate::models::OutcomeKind;
use crate::scheduler::SchedulerHandle;

/// One generated participant
#[derive(Debug, Clone, PartialEq)]
pub struct SimUser {
    pub user_id: String,
    pub display_name: String,
    pub interests: Vec<TopicId>,
    /// Offset from simulation start
    pub join_at_ms: u64,
    /// Offset from join, if the user gives up early
    pub leave_after_ms: Option<u64>,
}

pub fn generate_users(config: &SimulationConfig, max_wait_ms: u64) -> Vec<SimUser> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let topics = config.topics.max(1);
    let max_interests = config.max_interests.max(1);
    let leave_ratio = config.leave_ratio.clamp(0.0, 1.0);

    (0..config.users)
        .map(|i| {
            let n = rng.gen_range(1..=max_interests);
            let interests = (0..n)
                .map(|_| format!("q{}", rng.gen_range(0..topics)))
                .collect();
            let join_at_ms = rng.gen_range(0..=config.join_spread_ms);
            let leave_after_ms = rng
                .gen_bool(leave_ratio)
                .then(|| rng.gen_range(0..=max_wait_ms));
            SimUser {
                user_id: format!("sim-{}", i),
                display_name: format!("Sim User {}", i),
                interests,
                join_at_ms,
                leave_after_ms,
            }
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct SimulationReport {
    pub outcomes: FxHashMap<OutcomeKind, usize>,
    pub errors: usize,
}

impl SimulationReport {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.outcomes.values().sum::<usize>() + self.errors
    }
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Simulation: matched={} cancelled={} timed_out={} duplicate={} errors={}",
            self.count(OutcomeKind::Matched),
            self.count(OutcomeKind::Cancelled),
            self.count(OutcomeKind::TimedOut),
            self.count(OutcomeKind::DuplicateSession),
            self.errors
        )
    }
}

/// Play `users` against a running scheduler and tally the outcomes
pub async fn run(handle: &SchedulerHandle, users: Vec<SimUser>) -> SimulationReport {
    info!(users = users.len(), "Simulation started");

    let tasks = users.into_iter().map(|user| {
        let handle = handle.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(user.join_at_ms)).await;

            if let Some(delay) = user.leave_after_ms {
                let leaver = handle.clone();
                let user_id = user.user_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = leaver.leave(user_id).await;
                });
            }

            handle
                .join(user.user_id, user.display_name, user.interests)
                .await
        }
    });

    let mut report = SimulationReport::default();
    for result in join_all(tasks).await {
        match result {
            Ok(outcome) => *report.outcomes.entry(outcome.kind()).or_default() += 1,
            Err(e) => {
                warn!(error = %e, "Simulated join failed");
                report.errors += 1;
            }
        }
    }

    info!(report = %report, "Simulation finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::intake::{MemoryIntakeLog, ReplayFrom};
    use std::sync::Arc;

    fn sim_config() -> SimulationConfig {
        SimulationConfig {
            users: 50,
            topics: 5,
            max_interests: 3,
            seed: 7,
            leave_ratio: 0.1,
            join_spread_ms: 2_000,
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate_users(&sim_config(), 30_000);
        let b = generate_users(&sim_config(), 30_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        for u in &a {
            assert!(!u.interests.is_empty() && u.interests.len() <= 3);
            assert!(u.join_at_ms <= 2_000);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_user_gets_a_terminal_outcome() {
        let sched = SchedulerConfig {
            max_wait_ms: 10_000,
            batch_tick_ms: 1_000,
            command_queue_size: 64,
        };
        let (handle, task) =
            crate::scheduler::spawn(sched, Arc::new(MemoryIntakeLog::new()), ReplayFrom::Latest)
                .unwrap();

        let report = run(&handle, generate_users(&sim_config(), 10_000)).await;
        assert_eq!(report.total(), 50);
        assert_eq!(report.errors, 0);
        assert_eq!(report.count(OutcomeKind::DuplicateSession), 0);
        // Pairs produce an even number of Matched outcomes
        assert_eq!(report.count(OutcomeKind::Matched) % 2, 0);
        assert!(report.count(OutcomeKind::Matched) > 0);

        handle.shutdown().await;
        task.await.unwrap();
    }
}
