//! In-memory intake log

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{Delivery, DeliveryReceiver, IntakeKind, IntakeLog, ReplayFrom, Subscribers};
use crate::error::IntakeError;
use crate::models::MatchRequest;

#[derive(Debug, Default)]
struct Inner {
    /// Entries at or above the last checkpoint, oldest first
    entries: VecDeque<Delivery>,
    next_offset: u64,
    subscribers: Subscribers,
}

/// Keeps history since the last checkpoint in memory; not durable across
/// restarts
#[derive(Debug, Default)]
pub struct MemoryIntakeLog {
    inner: Mutex<Inner>,
}

impl MemoryIntakeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently retained
    pub fn len(&self) -> Result<usize, IntakeError> {
        Ok(self.inner.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, IntakeError> {
        Ok(self.len()? == 0)
    }
}

impl IntakeLog for MemoryIntakeLog {
    fn publish(&self, kind: IntakeKind, request: &MatchRequest) -> Result<u64, IntakeError> {
        let mut inner = self.inner.lock()?;
        let offset = inner.next_offset;
        inner.next_offset += 1;
        let delivery = Delivery {
            offset,
            kind,
            request: request.clone(),
        };
        inner.subscribers.deliver(&delivery);
        inner.entries.push_back(delivery);
        Ok(offset)
    }

    fn subscribe(&self, from: ReplayFrom) -> Result<DeliveryReceiver, IntakeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock()?;
        if from == ReplayFrom::Start {
            for delivery in &inner.entries {
                tx.send(delivery.clone()).map_err(|_| IntakeError::Closed)?;
            }
        }
        inner.subscribers.add(tx);
        Ok(rx)
    }

    fn checkpoint(&self, upto: u64) -> Result<usize, IntakeError> {
        let mut inner = self.inner.lock()?;
        let before = inner.entries.len();
        while inner.entries.front().is_some_and(|d| d.offset < upto) {
            inner.entries.pop_front();
        }
        Ok(before - inner.entries.len())
    }
}
