//! Error types
//!
//! Admission conflicts and expiry are outcomes, not errors (see
//! [`crate::models::Outcome`]). What remains here is infrastructure: the
//! intake log and the scheduler actor being gone.

use thiserror::Error;

/// Intake log failures
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Intake log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Intake payload codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Intake log corrupted: {0}")]
    Corrupted(String),

    #[error("Intake log lock poisoned")]
    Poisoned,

    #[error("Intake log closed")]
    Closed,
}

impl IntakeError {
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::Io(_) => "INTAKE_IO",
            IntakeError::Codec(_) => "INTAKE_CODEC",
            IntakeError::Corrupted(_) => "INTAKE_CORRUPTED",
            IntakeError::Poisoned => "INTAKE_POISONED",
            IntakeError::Closed => "INTAKE_CLOSED",
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for IntakeError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        IntakeError::Poisoned
    }
}

/// Errors surfaced to `join`/`leave` callers
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is shut down")]
    Shutdown,

    #[error("Intake log rejected the request: {0}")]
    Intake(#[from] IntakeError),
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Shutdown => "SCHEDULER_SHUTDOWN",
            SchedulerError::Intake(e) => e.code(),
        }
    }
}
