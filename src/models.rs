//! Request and outcome types
//!
//! `MatchRequest` is the durable unit that travels through the intake log;
//! `Outcome` is the terminal result handed back to a waiting caller.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{RequestId, SessionToken, TimestampMs, TopicId, UserId};

/// One user's request to be paired
///
/// Immutable once created. Re-queueing republishes the same value, so
/// `submitted_at` always measures age from the first admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub display_name: String,
    /// Ordered topic preferences; duplicates allowed, first compatible wins
    pub interests: Vec<TopicId>,
    pub submitted_at: TimestampMs,
}

impl MatchRequest {
    pub fn new(
        request_id: RequestId,
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        interests: Vec<TopicId>,
        submitted_at: TimestampMs,
    ) -> Self {
        Self {
            request_id,
            user_id: user_id.into(),
            display_name: display_name.into(),
            interests,
            submitted_at,
        }
    }

    /// Age of the request at `now`, saturating at zero
    #[inline]
    pub fn age_ms(&self, now: TimestampMs) -> u64 {
        now.saturating_sub(self.submitted_at)
    }

    #[inline]
    pub fn is_expired(&self, now: TimestampMs, max_wait_ms: u64) -> bool {
        self.age_ms(now) >= max_wait_ms
    }
}

/// The per-side view of a produced match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub user_id: UserId,
    pub peer_user_id: UserId,
    pub peer_display_name: String,
    pub agreed_topic: TopicId,
    pub session_token: SessionToken,
}

/// Terminal result of a `join`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outcome {
    Matched {
        peer_user_id: UserId,
        peer_display_name: String,
        agreed_topic: TopicId,
        session_token: SessionToken,
    },
    DuplicateSession {
        reason: String,
    },
    Cancelled,
    TimedOut,
}

impl Outcome {
    pub fn duplicate(user_id: &str) -> Self {
        Outcome::DuplicateSession {
            reason: format!("user {} already has a pending match request", user_id),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Matched { .. } => OutcomeKind::Matched,
            Outcome::DuplicateSession { .. } => OutcomeKind::DuplicateSession,
            Outcome::Cancelled => OutcomeKind::Cancelled,
            Outcome::TimedOut => OutcomeKind::TimedOut,
        }
    }
}

impl From<MatchOutcome> for Outcome {
    fn from(m: MatchOutcome) -> Self {
        Outcome::Matched {
            peer_user_id: m.peer_user_id,
            peer_display_name: m.peer_display_name,
            agreed_topic: m.agreed_topic,
            session_token: m.session_token,
        }
    }
}

/// Fieldless discriminant of [`Outcome`], handy for tallies and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Matched,
    DuplicateSession,
    Cancelled,
    TimedOut,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Matched => "MATCHED",
            OutcomeKind::DuplicateSession => "DUPLICATE_SESSION",
            OutcomeKind::Cancelled => "CANCELLED",
            OutcomeKind::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let req = MatchRequest::new(1, "u1", "Ann", vec!["x".into()], 1_000);
        assert!(!req.is_expired(30_999, 30_000));
        assert!(req.is_expired(31_000, 30_000));
        assert!(req.is_expired(45_000, 30_000));
    }

    #[test]
    fn test_age_saturates() {
        let req = MatchRequest::new(1, "u1", "Ann", vec![], 5_000);
        assert_eq!(req.age_ms(4_000), 0);
    }

    #[test]
    fn test_match_outcome_into_outcome() {
        let m = MatchOutcome {
            user_id: "a".into(),
            peer_user_id: "b".into(),
            peer_display_name: "Bea".into(),
            agreed_topic: "t1".into(),
            session_token: "tok".into(),
        };
        let outcome: Outcome = m.into();
        assert_eq!(outcome.kind(), OutcomeKind::Matched);
        assert!(matches!(
            outcome,
            Outcome::Matched { ref peer_user_id, .. } if peer_user_id == "b"
        ));
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let json = serde_json::to_string(&Outcome::TimedOut).unwrap();
        assert_eq!(json, r#"{"type":"TimedOut"}"#);
        assert_eq!(OutcomeKind::DuplicateSession.to_string(), "DUPLICATE_SESSION");
    }
}
