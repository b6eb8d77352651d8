//! The job state machine, in one auditable place.
//!
//! `pending → processing → completed | partially_completed | failed`,
//! `pending | processing → cancelled`, `processing → pending` on a queued
//! retry. Terminal states are sticky: nothing leaves them except record
//! deletion.

use thiserror::Error;

use crate::types::JobStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job is already terminal ({from}); cannot transition to {to}")]
    Terminal { from: JobStatus, to: JobStatus },

    #[error("invalid transition {from} -> {to}")]
    Invalid { from: JobStatus, to: JobStatus },
}

/// Check whether `from -> to` is a legal transition.
pub fn check(from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
    use JobStatus::*;

    if from.is_terminal() {
        return Err(TransitionError::Terminal { from, to });
    }

    let ok = match (from, to) {
        (Pending, Processing) => true,
        (Pending, Cancelled) => true,
        // Queue-side exhaustion can fail a job that never got claimed again.
        (Pending, Failed) => true,
        (Processing, Completed) => true,
        (Processing, PartiallyCompleted) => true,
        (Processing, Failed) => true,
        (Processing, Cancelled) => true,
        // A transient failure re-queues the job for a later attempt.
        (Processing, Pending) => true,
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(TransitionError::Invalid { from, to })
    }
}

/// Merge a progress write: clamp to [0,100] and ignore regressions, so a
/// late-arriving lower value never makes progress flicker backwards.
pub fn merge_progress(current: u8, incoming: u8) -> u8 {
    incoming.min(100).max(current)
}
