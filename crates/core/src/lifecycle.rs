use thiserror::Error;

use crate::types::JobStatus;

/// Statuses reachable from `current` in a single update.
///
/// `applied` is the sole initial state; `offer` and `rejected` are terminal.
/// Self-transitions are never allowed.
pub fn allowed_next(current: JobStatus) -> &'static [JobStatus] {
    match current {
        JobStatus::Applied => &[JobStatus::Interview, JobStatus::Rejected],
        JobStatus::Interview => &[JobStatus::Offer, JobStatus::Rejected],
        JobStatus::Offer | JobStatus::Rejected => &[],
    }
}

/// Returns `true` when the status has no outgoing transitions.
pub fn is_terminal(status: JobStatus) -> bool {
    allowed_next(status).is_empty()
}

/// Checks the transition table for `current -> requested`.
///
/// The caller is expected to pass the *persisted* current status; the table
/// is never evaluated against a client-supplied "from" value.
pub fn validate_transition(
    current: JobStatus,
    requested: JobStatus,
) -> Result<(), InvalidTransition> {
    if allowed_next(current).contains(&requested) {
        Ok(())
    } else {
        Err(InvalidTransition {
            from: current,
            to: requested,
        })
    }
}

/// Raised when a requested status is not reachable from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}
