//! Batch Matcher - greedy, first-topic-wins pairing over one tick's batch
//!
//! # Pass
//!
//! ```text
//! drain ─▶ stable sort by |interests| ─▶ drop cancelled/stale ─▶ scan
//!                                                                 │
//!        ┌────────────────────────────────────────────────────────┤
//!        ▼                         ▼                              ▼
//!     expired                   matched                       unmatched
//!  (registry purge)     (registry purge, 2 outcomes)     (re-queue as-is)
//! ```
//!
//! The pass runs to completion on one turn of the scheduler actor. It never
//! fails: expiry and re-queue are its only non-match results. Matching is a
//! streaming heuristic, not a maximum-cardinality matching.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use uuid::Uuid;

use crate::core_types::{SessionToken, TimestampMs, TopicId, UserId};
use crate::models::{MatchOutcome, MatchRequest};
use crate::registry::MembershipRegistry;

/// A pair produced by one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPair {
    /// The entry whose topic scan found the candidate
    pub initiator: MatchRequest,
    /// The standing candidate for `topic`
    pub candidate: MatchRequest,
    pub topic: TopicId,
    pub session_token: SessionToken,
}

impl MatchPair {
    /// Symmetric outcomes: each side names the other as peer
    pub fn outcomes(&self) -> [MatchOutcome; 2] {
        [
            MatchOutcome {
                user_id: self.initiator.user_id.clone(),
                peer_user_id: self.candidate.user_id.clone(),
                peer_display_name: self.candidate.display_name.clone(),
                agreed_topic: self.topic.clone(),
                session_token: self.session_token.clone(),
            },
            MatchOutcome {
                user_id: self.candidate.user_id.clone(),
                peer_user_id: self.initiator.user_id.clone(),
                peer_display_name: self.initiator.display_name.clone(),
                agreed_topic: self.topic.clone(),
                session_token: self.session_token.clone(),
            },
        ]
    }
}

/// Everything one pass decided
#[derive(Debug, Default)]
pub struct PassReport {
    pub matches: Vec<MatchPair>,
    /// Live requests found past `max_wait`; already purged from the registry
    pub expired: Vec<MatchRequest>,
    /// Live requests to republish unchanged; still in the registry
    pub requeue: Vec<MatchRequest>,
    /// Entries dropped silently (cancelled this tick, or no longer live)
    pub dropped: usize,
}

impl PassReport {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
            && self.expired.is_empty()
            && self.requeue.is_empty()
            && self.dropped == 0
    }
}

pub struct BatchMatcher {
    max_wait_ms: u64,
}

impl BatchMatcher {
    pub fn new(max_wait_ms: u64) -> Self {
        Self { max_wait_ms }
    }

    pub fn max_wait_ms(&self) -> u64 {
        self.max_wait_ms
    }

    /// Run one pass over a drained batch
    ///
    /// Mutates `registry` for matched and expired users and clears
    /// `cancelled` before returning.
    pub fn run_pass(
        &self,
        mut batch: Vec<MatchRequest>,
        now: TimestampMs,
        registry: &mut MembershipRegistry,
        cancelled: &mut FxHashSet<UserId>,
    ) -> PassReport {
        let mut report = PassReport::default();
        if batch.is_empty() {
            cancelled.clear();
            return report;
        }

        // Fewer interests first; ties keep delivery order (stable sort)
        batch.sort_by_key(|r| r.interests.len());

        // user -> index of the entry that represents the user in this pass
        let mut unmatched: FxHashMap<&str, usize> = FxHashMap::default();
        for (idx, entry) in batch.iter().enumerate() {
            if cancelled.contains(&entry.user_id) || !registry.is_live(entry) {
                report.dropped += 1;
                continue;
            }
            unmatched.entry(entry.user_id.as_str()).or_insert(idx);
        }

        // topic -> index of the standing candidate
        let mut candidates: FxHashMap<&str, usize> = FxHashMap::default();

        for (idx, entry) in batch.iter().enumerate() {
            let user = entry.user_id.as_str();
            // Only the representative entry acts for a user; stale copies and
            // duplicates neither expire nor stand as candidates
            if unmatched.get(user) != Some(&idx) {
                continue;
            }

            if entry.is_expired(now, self.max_wait_ms) {
                unmatched.remove(user);
                registry.remove(user);
                debug!(user_id = %user, age_ms = entry.age_ms(now), "Request expired in pass");
                report.expired.push(entry.clone());
                continue;
            }

            for topic in &entry.interests {
                let standing = candidates
                    .get(topic.as_str())
                    .map(|&c| &batch[c])
                    .filter(|c| {
                        c.user_id != entry.user_id && unmatched.contains_key(c.user_id.as_str())
                    });

                match standing {
                    Some(candidate) => {
                        unmatched.remove(user);
                        unmatched.remove(candidate.user_id.as_str());
                        registry.remove(user);
                        registry.remove(&candidate.user_id);

                        debug!(
                            user_id = %user,
                            peer_user_id = %candidate.user_id,
                            topic = %topic,
                            "Pair found"
                        );
                        report.matches.push(MatchPair {
                            initiator: entry.clone(),
                            candidate: candidate.clone(),
                            topic: topic.clone(),
                            session_token: Uuid::new_v4().to_string(),
                        });
                        break;
                    }
                    None => {
                        candidates.insert(topic.as_str(), idx);
                    }
                }
            }
        }

        // Re-queue in pass order so later ticks see a stable sequence
        report.requeue = batch
            .iter()
            .enumerate()
            .filter(|(idx, r)| unmatched.get(r.user_id.as_str()) == Some(idx))
            .map(|(_, r)| r.clone())
            .collect();

        cancelled.clear();
        report
    }
}
