//! Membership Registry - the authoritative set of waiting users
//!
//! # Invariant
//!
//! A user ID appears at most once. Only the scheduler actor owns the
//! registry, so every operation below runs on a single writer turn and no
//! locking is needed.

use rustc_hash::FxHashMap;

use crate::core_types::{RequestId, TimestampMs, UserId};
use crate::models::MatchRequest;

/// What the registry remembers about an admitted user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub submitted_at: TimestampMs,
    pub request_id: RequestId,
}

#[derive(Debug, Default)]
pub struct MembershipRegistry {
    entries: FxHashMap<UserId, Admission>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `user_id` unless it is already waiting
    ///
    /// Returns `false` on an admission conflict; the existing entry is left
    /// untouched.
    pub fn try_admit(&mut self, user_id: &str, admission: Admission) -> bool {
        if self.entries.contains_key(user_id) {
            return false;
        }
        self.entries.insert(user_id.to_owned(), admission);
        true
    }

    /// Idempotent removal; returns the admission if one was present
    pub fn remove(&mut self, user_id: &str) -> Option<Admission> {
        self.entries.remove(user_id)
    }

    #[inline]
    pub fn is_present(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&Admission> {
        self.entries.get(user_id)
    }

    /// True when `request` is the admission currently on record for its user
    ///
    /// Requests from an earlier incarnation (the user left and re-joined, or
    /// the log was replayed after a restart) are not live.
    #[inline]
    pub fn is_live(&self, request: &MatchRequest) -> bool {
        self.entries
            .get(&request.user_id)
            .is_some_and(|a| a.request_id == request.request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admission(request_id: RequestId) -> Admission {
        Admission {
            submitted_at: 1_000,
            request_id,
        }
    }

    #[test]
    fn test_second_admission_is_refused() {
        let mut reg = MembershipRegistry::new();
        assert!(reg.try_admit("alice", admission(1)));
        assert!(!reg.try_admit("alice", admission(2)));

        // The original admission survives the refused attempt
        assert_eq!(reg.get("alice").unwrap().request_id, 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut reg = MembershipRegistry::new();
        reg.try_admit("bob", admission(1));

        assert!(reg.remove("bob").is_some());
        assert!(reg.remove("bob").is_none());
        assert!(!reg.is_present("bob"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_zero_like_ids_are_ordinary_members() {
        let mut reg = MembershipRegistry::new();
        assert!(reg.try_admit("0", admission(1)));
        assert!(reg.try_admit("", admission(2)));
        assert!(reg.is_present("0"));
        assert!(reg.is_present(""));
    }

    #[test]
    fn test_liveness_tracks_request_id() {
        let mut reg = MembershipRegistry::new();
        reg.try_admit("carol", admission(7));

        let current = MatchRequest::new(7, "carol", "Carol", vec![], 1_000);
        let stale = MatchRequest::new(3, "carol", "Carol", vec![], 500);
        let stranger = MatchRequest::new(9, "dave", "Dave", vec![], 500);

        assert!(reg.is_live(&current));
        assert!(!reg.is_live(&stale));
        assert!(!reg.is_live(&stranger));
    }
}
