//! Batch Accumulator - requests delivered since the last tick

use crate::models::MatchRequest;

#[derive(Debug, Default)]
pub struct BatchAccumulator {
    batch: Vec<MatchRequest>,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivered request. Re-queued requests are fresh entries,
    /// never suppressed as duplicates.
    #[inline]
    pub fn accept(&mut self, request: MatchRequest) {
        self.batch.push(request);
    }

    /// Hand the whole batch to the matcher and start an empty one
    pub fn drain_and_reset(&mut self) -> Vec<MatchRequest> {
        std::mem::take(&mut self.batch)
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}
