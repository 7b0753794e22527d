//! Intake Log - durable, ordered, replayable feed of match requests
//!
//! The scheduler publishes every admitted request (and every re-queue) here
//! and consumes the same stream back into its batch accumulator.
//!
//! # Contract
//!
//! 1. **Ordered**: a subscriber sees entries in publish order
//! 2. **At-least-once**: redelivery is possible; the matcher's liveness
//!    check, not the log, makes it harmless
//! 3. **Replayable**: `ReplayFrom::Start` delivers history first, then live
//!    entries, with no gap between the two
//! 4. **Bounded**: history only reaches back to the consumer's last
//!    checkpoint; every pass supersedes what it consumed, so the retained
//!    tail is roughly one tick of traffic
//!
//! Two backends share the contract: [`MemoryIntakeLog`] for tests and
//! single-process deployments, [`WalIntakeLog`] for crash-safe operation.

pub mod file;
pub mod memory;
pub mod wal;

use tokio::sync::mpsc;

use crate::error::IntakeError;
use crate::models::MatchRequest;
use crate::wal_v2::WalEntryType;

pub use file::WalIntakeLog;
pub use memory::MemoryIntakeLog;
pub use wal::{IntakeWalReader, IntakeWalWriter};

/// Why a request is being published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeKind {
    Join,
    Requeue,
}

impl From<IntakeKind> for WalEntryType {
    fn from(kind: IntakeKind) -> Self {
        match kind {
            IntakeKind::Join => WalEntryType::Join,
            IntakeKind::Requeue => WalEntryType::Requeue,
        }
    }
}

impl From<WalEntryType> for IntakeKind {
    fn from(t: WalEntryType) -> Self {
        match t {
            WalEntryType::Join => IntakeKind::Join,
            WalEntryType::Requeue => IntakeKind::Requeue,
        }
    }
}

/// Where a new subscription starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayFrom {
    /// Everything ever published, then live entries
    Start,
    /// Only entries published after subscribing
    Latest,
}

/// One delivered log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub offset: u64,
    pub kind: IntakeKind,
    pub request: MatchRequest,
}

/// Unbounded so that the scheduler can publish into the log it consumes
/// from without ever blocking its own turn.
pub type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;

pub trait IntakeLog: Send + Sync {
    /// Append `request`; returns its log offset
    fn publish(&self, kind: IntakeKind, request: &MatchRequest) -> Result<u64, IntakeError>;

    /// Start asynchronous in-order delivery
    fn subscribe(&self, from: ReplayFrom) -> Result<DeliveryReceiver, IntakeError>;

    /// Release entries with `offset < upto`; returns how many were released
    ///
    /// Called by the consumer once everything below `upto` has been acted on.
    /// Released entries are no longer replayed by `ReplayFrom::Start`. A
    /// backend may release lazily, but what it retains stays bounded.
    fn checkpoint(&self, upto: u64) -> Result<usize, IntakeError>;
}

/// Live subscriber fan-out shared by both backends
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<Delivery>>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, tx: mpsc::UnboundedSender<Delivery>) {
        self.senders.push(tx);
    }

    /// Deliver to every live subscriber, forgetting closed ones
    pub(crate) fn deliver(&mut self, delivery: &Delivery) {
        self.senders.retain(|tx| tx.send(delivery.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
