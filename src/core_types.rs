//! Core types used throughout the scheduler
//!
//! Plain aliases: they give semantic meaning at API boundaries without
//! forcing conversions on callers of the connection layer.

/// User ID - opaque, stable identifier supplied by the account service.
///
/// # Constraints:
/// - **Opaque**: never parsed, compared only for equality
/// - **No sentinel**: every string is a legitimate identifier, including
///   `""` and `"0"`. Absence is always expressed with `Option` or map membership.
pub type UserId = String;

/// Topic ID - a question identifier from the catalog
pub type TopicId = String;

/// Session token handed to both sides of a match
pub type SessionToken = String;

/// Admission number assigned by the scheduler, strictly increasing
pub type RequestId = u64;

/// Milliseconds on the scheduler clock (see [`crate::clock::Clock`])
pub type TimestampMs = u64;
