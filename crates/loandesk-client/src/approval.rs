//! Approval workflow
//!
//! Approve/reject is irreversible, so the user must retype a random
//! challenge shown next to the form. A mismatch never reaches the network.

use crate::coordinator::{Command, CommandOutput, EffectCoordinator, EntityScope, RunOutcome};
use crate::error::ClientError;
use loandesk_core::{Decision, FileId};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

/// Open decision form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalForm {
    file_id: FileId,
    challenge: String,
}

impl ApprovalForm {
    #[must_use]
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Text to display and have the user retype
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Replace the challenge, e.g. after a mismatch
    pub fn regenerate(&mut self) {
        self.challenge = generate_challenge(self.challenge.len());
    }
}

/// Decision whose challenge was matched
///
/// Only this module can build one, so `Command::Decide` cannot bypass the
/// confirmation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedDecision {
    file_id: FileId,
    decision: Decision,
    remarks: String,
}

impl ConfirmedDecision {
    pub(crate) fn new(file_id: FileId, decision: Decision, remarks: String) -> Self {
        Self {
            file_id,
            decision,
            remarks,
        }
    }

    #[must_use]
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    #[must_use]
    pub fn decision(&self) -> Decision {
        self.decision
    }

    #[must_use]
    pub fn remarks(&self) -> &str {
        &self.remarks
    }
}

/// Confirmation gate in front of decisions
#[derive(Debug, Clone)]
pub struct ApprovalWorkflow {
    coordinator: Arc<EffectCoordinator>,
    challenge_length: usize,
}

impl ApprovalWorkflow {
    #[must_use]
    pub fn new(coordinator: Arc<EffectCoordinator>, challenge_length: usize) -> Self {
        Self {
            coordinator,
            challenge_length: challenge_length.max(1),
        }
    }

    /// Open the decision form for `file_id` with a fresh challenge
    #[must_use]
    pub fn open(&self, file_id: FileId) -> ApprovalForm {
        self.coordinator
            .entities()
            .clear_error(&EntityScope::Decision(file_id.clone()));
        ApprovalForm {
            file_id,
            challenge: generate_challenge(self.challenge_length),
        }
    }

    /// Submit a decision if `confirmation` matches the form's challenge
    ///
    /// The comparison is exact: no trimming, case-sensitive.
    pub async fn request_decision(
        &self,
        form: &ApprovalForm,
        decision: Decision,
        remarks: impl Into<String>,
        confirmation: &str,
    ) -> RunOutcome<CommandOutput> {
        if confirmation != form.challenge {
            tracing::warn!(file_id = %form.file_id, "decision confirmation mismatch");
            let err = ClientError::ConfirmationMismatch;
            self.coordinator
                .surface_local(EntityScope::Decision(form.file_id.clone()), &err);
            return RunOutcome::Failed(err);
        }

        let confirmed = ConfirmedDecision::new(form.file_id.clone(), decision, remarks.into());
        self.coordinator.dispatch(Command::Decide(confirmed)).await
    }
}

fn generate_challenge(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
