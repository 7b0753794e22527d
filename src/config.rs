use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub scheduler: SchedulerConfig,
    pub intake: IntakeConfig,
    pub simulation: SimulationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "pair_scheduler.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            scheduler: SchedulerConfig::default(),
            intake: IntakeConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Matching cadence and wait bound
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long a caller waits before `TimedOut`
    pub max_wait_ms: u64,
    /// Period of the batch pass
    pub batch_tick_ms: u64,
    /// Capacity of the join/leave command queue
    pub command_queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 30_000,
            batch_tick_ms: 3_000,
            command_queue_size: 1024,
        }
    }
}

impl SchedulerConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn batch_tick(&self) -> Duration {
        Duration::from_millis(self.batch_tick_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntakeBackend {
    Memory,
    Wal,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IntakeConfig {
    pub backend: IntakeBackend,
    pub data_dir: String,
    /// Replay the whole log into the first batch on start-up
    pub replay_from_start: bool,
    /// Released WAL frames tolerated before the file is compacted
    pub compact_after_frames: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            backend: IntakeBackend::Memory,
            data_dir: "./data/intake".to_string(),
            replay_from_start: false,
            compact_after_frames: 4096,
        }
    }
}

/// Synthetic workload driven by the binary
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    pub users: usize,
    pub topics: usize,
    pub max_interests: usize,
    pub seed: u64,
    /// Fraction of users that leave before their outcome arrives
    pub leave_ratio: f64,
    /// Joins are spread uniformly over this window
    pub join_spread_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            users: 200,
            topics: 40,
            max_interests: 4,
            seed: 42,
            leave_ratio: 0.05,
            join_spread_ms: 10_000,
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let cfg = AppConfig::from_yaml(
            r#"
log_level: debug
scheduler:
  batch_tick_ms: 500
intake:
  backend: wal
"#,
        )
        .unwrap();

        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.scheduler.batch_tick(), Duration::from_millis(500));
        assert_eq!(cfg.scheduler.max_wait(), Duration::from_secs(30));
        assert_eq!(cfg.intake.backend, IntakeBackend::Wal);
        assert_eq!(cfg.intake.data_dir, "./data/intake");
        assert_eq!(cfg.simulation.users, 200);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(AppConfig::from_yaml("intake:\n  backend: kafka\n").is_err());
    }

    #[test]
    fn test_repo_config_parses() {
        let cfg = AppConfig::load("dev").unwrap();
        assert!(cfg.scheduler.max_wait_ms >= cfg.scheduler.batch_tick_ms);
    }
}
