//! Error types for case-file orchestration

use crate::case_file::FileStatus;
use crate::step::Step;

/// Errors raised by the step orchestration state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    /// Declared step sequence is empty or repeats a step
    #[error("invalid step sequence: {0}")]
    InvalidSequence(String),

    /// Step is not part of the declared sequence
    #[error("step '{0}' is not declared for this case file")]
    UnknownStep(Step),

    /// Transition would skip an incomplete step or verify an incomplete one
    #[error("invalid transition from '{from}' to '{to}': {reason}")]
    InvalidTransition {
        /// Active step at the time of the attempt
        from: Step,
        /// Requested step
        to: Step,
        /// Human-readable cause
        reason: String,
    },

    /// File is approved or rejected
    #[error("case file is terminal ({status})")]
    Terminal {
        /// Terminal status the file is in
        status: FileStatus,
    },

    /// Status change not reachable through `set_status`
    #[error("status '{0}' can only be reached through a decision")]
    DecisionRequired(FileStatus),

    /// Reopen policy refused the actor
    #[error("reopen denied for actor '{actor}'")]
    ReopenDenied {
        /// Actor that asked for the reopen
        actor: String,
    },
}

impl OrchestratorError {
    /// Create an invalid transition error
    #[inline]
    pub fn invalid_transition(from: Step, to: Step, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from,
            to,
            reason: reason.into(),
        }
    }

    /// Check if the error comes from a terminal file
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}
