//! pair_scheduler - batch matchmaking for one-to-one sessions
//!
//! Users ask to be paired with someone sharing an interest. Requests are
//! collected for a tick, matched greedily in one pass, and every caller
//! receives exactly one terminal outcome.
//!
//! # Modules
//!
//! - [`core_types`] - Id and timestamp aliases
//! - [`models`] - MatchRequest, MatchOutcome and the caller-facing Outcome
//! - [`registry`] - Who is currently waiting
//! - [`accumulator`] - Requests gathered for the next pass
//! - [`matcher`] - The greedy pairing pass
//! - [`dispatcher`] - Per-user outcome slots and the caller-side wait
//! - [`intake`] - Append-only intake log (memory and WAL backends)
//! - [`wal_v2`] - Checksummed WAL framing used by the file backend
//! - [`scheduler`] - The actor that owns all of the above
//! - [`stats`] - Counters
//! - [`simulation`] - Seeded synthetic workload

// Core types - must be first!
pub mod core_types;

pub mod accumulator;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod intake;
pub mod matcher;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod wal_v2;

// Ambient
pub mod config;
pub mod logging;
pub mod simulation;

// Convenient re-exports at crate root
pub use core_types::{RequestId, SessionToken, TimestampMs, TopicId, UserId};
pub use error::{IntakeError, SchedulerError};
pub use intake::{IntakeKind, IntakeLog, MemoryIntakeLog, ReplayFrom, WalIntakeLog};
pub use models::{MatchOutcome, MatchRequest, Outcome, OutcomeKind};
pub use scheduler::{SchedulerHandle, spawn};
pub use stats::SchedulerStatsSnapshot;
