//! User actions the coordinator knows how to run

use super::entity::EntityScope;
use crate::approval::ConfirmedDecision;
use crate::navigation::Route;
use loandesk_core::{ActionKey, Decision, DraftId, FileId, FileStatus, Step, StepPayload, Transition};
use serde_json::Value;
use std::fmt;

/// Generated notice document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Legal,
    Company,
}

impl NoticeKind {
    /// Endpoint suffix
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Legal => "legalNotice",
            NoticeKind::Company => "companyNotice",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action triggered by the user
#[derive(Debug, Clone)]
pub enum Command {
    Login { email: String, password: String },
    ForgotPassword { email: String },
    Logout,
    /// Submit the form of one step
    SubmitStep {
        draft: DraftId,
        step: Step,
        payload: StepPayload,
    },
    /// Navigate to an already reachable step
    ActivateStep { draft: DraftId, step: Step },
    VerifyStep { draft: DraftId, step: Step },
    FetchCibilScore { file_id: FileId },
    /// Approve or reject; built by the approval workflow only
    Decide(ConfirmedDecision),
    FetchDashboard,
    EditNotice { kind: NoticeKind, body: Value },
    FetchLedger,
    UpdateLedger { body: Value },
    FetchOrganizationConfig { organization: String },
    FetchQuestions,
    CreateQuestion { body: Value },
    UpdateQuestion { body: Value },
}

impl Command {
    /// Key serializing repeated triggers of this action
    #[must_use]
    pub fn action_key(&self) -> ActionKey {
        match self {
            Command::Login { .. } => ActionKey::new("auth:login"),
            Command::ForgotPassword { .. } => ActionKey::new("auth:forgot-password"),
            Command::Logout => ActionKey::new("auth:logout"),
            Command::SubmitStep { draft, step, .. } => ActionKey::step(*draft, *step),
            Command::ActivateStep { draft, .. } => ActionKey::new(format!("activate:{draft}")),
            Command::VerifyStep { draft, step } => ActionKey::new(format!("verify:{draft}:{step}")),
            Command::FetchCibilScore { file_id } => ActionKey::new(format!("cibil-score:{file_id}")),
            Command::Decide(decision) => ActionKey::decision(decision.file_id()),
            Command::FetchDashboard => ActionKey::new("dashboard:fetch"),
            Command::EditNotice { kind, .. } => ActionKey::new(format!("notice:{kind}")),
            Command::FetchLedger => ActionKey::new("ledger:fetch"),
            Command::UpdateLedger { .. } => ActionKey::new("ledger:update"),
            Command::FetchOrganizationConfig { organization } => {
                ActionKey::new(format!("organization-config:{organization}"))
            }
            Command::FetchQuestions => ActionKey::new("questions:fetch"),
            Command::CreateQuestion { .. } => ActionKey::new("questions:create"),
            Command::UpdateQuestion { .. } => ActionKey::new("questions:update"),
        }
    }

    /// Scope receiving loading and error state
    #[must_use]
    pub fn scope(&self) -> EntityScope {
        match self {
            Command::Login { .. } | Command::ForgotPassword { .. } | Command::Logout => {
                EntityScope::Auth
            }
            Command::SubmitStep { draft, .. }
            | Command::ActivateStep { draft, .. }
            | Command::VerifyStep { draft, .. } => EntityScope::CaseFile(*draft),
            Command::FetchCibilScore { file_id } => EntityScope::CibilScore(file_id.clone()),
            Command::Decide(decision) => EntityScope::Decision(decision.file_id().clone()),
            Command::FetchDashboard => EntityScope::Dashboard,
            Command::EditNotice { .. } => EntityScope::Notice,
            Command::FetchLedger | Command::UpdateLedger { .. } => EntityScope::Ledger,
            Command::FetchOrganizationConfig { .. } => EntityScope::OrganizationConfig,
            Command::FetchQuestions
            | Command::CreateQuestion { .. }
            | Command::UpdateQuestion { .. } => EntityScope::Questions,
        }
    }
}

/// Result of a completed command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Session installed; navigation moved to `landing`
    SignedIn { landing: Route },
    ResetRequested,
    SignedOut,
    StepSubmitted {
        transition: Transition,
        file_id: Option<FileId>,
    },
    StepActivated(Transition),
    /// `newly` is false when the step was already verified
    StepVerified { newly: bool },
    CibilScore(Value),
    Decided {
        file_id: FileId,
        decision: Decision,
        /// Local status after the decision, if the file is tracked here
        status: Option<FileStatus>,
    },
    Dashboard(Value),
    /// PDF bytes
    Notice(Vec<u8>),
    Ledger(Value),
    OrganizationConfig(Value),
    Questions(Value),
    QuestionSaved(Value),
}
