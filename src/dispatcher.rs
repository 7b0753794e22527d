//! Outcome Dispatcher - one-shot outcome slot per waiting user
//!
//! # State Machine
//!
//! ```text
//! Waiting ──match──▶ Matched
//!    │ ───cancel──▶ Cancelled
//!    └───timer────▶ TimedOut
//! ```
//!
//! Each slot is a `tokio::sync::oneshot` sender, so whichever path resolves
//! it first is the only one that counts. The caller's timer does not reach
//! back into the dispatcher; a slot whose receiver already gave up is simply
//! completed into the void later, which is harmless.

use rustc_hash::FxHashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::core_types::UserId;
use crate::error::SchedulerError;
use crate::models::{MatchOutcome, Outcome};

#[derive(Debug, Default)]
pub struct OutcomeDispatcher {
    pending: FxHashMap<UserId, oneshot::Sender<Outcome>>,
}

impl OutcomeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `user_id` and return the receiving half
    ///
    /// A leftover slot for the same user is replaced; its receiver sees the
    /// sender dropped.
    pub fn register(&mut self, user_id: &str) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(user_id.to_owned(), tx);
        rx
    }

    /// Drop a slot without resolving it
    pub fn discard(&mut self, user_id: &str) {
        self.pending.remove(user_id);
    }

    /// Resolve the slot for `user_id`
    ///
    /// Returns `true` if a caller was still listening. Missing slots and
    /// departed listeners are no-ops.
    pub fn fire(&mut self, user_id: &str, outcome: Outcome) -> bool {
        match self.pending.remove(user_id) {
            Some(tx) => {
                let delivered = tx.send(outcome).is_ok();
                if !delivered {
                    debug!(user_id = %user_id, "Outcome arrived after caller stopped waiting");
                }
                delivered
            }
            None => false,
        }
    }

    pub fn fire_match(&mut self, outcome: MatchOutcome) -> bool {
        let user_id = outcome.user_id.clone();
        self.fire(&user_id, outcome.into())
    }

    pub fn fire_cancel(&mut self, user_id: &str) -> bool {
        self.fire(user_id, Outcome::Cancelled)
    }

    pub fn fire_timeout(&mut self, user_id: &str) -> bool {
        self.fire(user_id, Outcome::TimedOut)
    }

    /// Drop every slot; waiting callers observe a shutdown
    pub fn close_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, user_id: &str) -> bool {
        self.pending.contains_key(user_id)
    }
}

/// Race an admitted request's slot against its own wait timer
///
/// The timer starts when this is called, which is after admission, so
/// `TimedOut` is never produced before `max_wait` has elapsed.
pub async fn await_outcome(
    rx: oneshot::Receiver<Outcome>,
    max_wait: Duration,
) -> Result<Outcome, SchedulerError> {
    match tokio::time::timeout(max_wait, rx).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(_)) => Err(SchedulerError::Shutdown),
        Err(_) => Ok(Outcome::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(user: &str, peer: &str) -> MatchOutcome {
        MatchOutcome {
            user_id: user.into(),
            peer_user_id: peer.into(),
            peer_display_name: peer.to_uppercase(),
            agreed_topic: "t".into(),
            session_token: "s-1".into(),
        }
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let mut d = OutcomeDispatcher::new();
        let rx = d.register("a");

        assert!(d.fire_cancel("a"));
        // Slot is gone: a late match is a no-op
        assert!(!d.fire_match(matched("a", "b")));
        assert!(!d.fire_timeout("a"));

        assert_eq!(rx.await.unwrap(), Outcome::Cancelled);
        assert_eq!(d.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_late_delivery_after_receiver_dropped() {
        let mut d = OutcomeDispatcher::new();
        let rx = d.register("a");
        drop(rx);

        assert!(!d.fire_match(matched("a", "b")));
        assert!(!d.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_when_nothing_arrives() {
        let mut d = OutcomeDispatcher::new();
        let rx = d.register("lonely");

        let start = tokio::time::Instant::now();
        let outcome = await_outcome(rx, Duration::from_secs(30)).await.unwrap();
        assert_eq!(outcome, Outcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(30));

        // The slot is still open until someone purges it
        assert!(d.is_pending("lonely"));
        assert!(!d.fire_timeout("lonely"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_beats_timer() {
        let mut d = OutcomeDispatcher::new();
        let rx = d.register("a");
        let waiter = tokio::spawn(await_outcome(rx, Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        d.fire_match(matched("a", "b"));

        let outcome = waiter.await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Matched { ref peer_user_id, .. } if peer_user_id == "b"));
    }

    #[tokio::test]
    async fn test_close_all_reports_shutdown() {
        let mut d = OutcomeDispatcher::new();
        let rx = d.register("a");
        assert_eq!(d.close_all(), 1);

        let err = await_outcome(rx, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Shutdown));
    }
}
