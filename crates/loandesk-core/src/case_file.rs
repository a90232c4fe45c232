//! Case file record and identifiers

use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ulid::Ulid;

/// Server-assigned case-file identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local identifier of a case file, valid before the server assigns one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DraftId(pub Ulid);

impl DraftId {
    /// Generate new draft ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Case-file status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    #[serde(rename = "Under Review")]
    UnderReview,
    Approved,
    Rejected,
    #[serde(rename = "On Hold")]
    OnHold,
    Expired,
    Scheduled,
    Completed,
}

impl FileStatus {
    /// Approved and Rejected admit no transition except reopen
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Approved | FileStatus::Rejected)
    }

    /// Wire label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Pending => "Pending",
            FileStatus::UnderReview => "Under Review",
            FileStatus::Approved => "Approved",
            FileStatus::Rejected => "Rejected",
            FileStatus::OnHold => "On Hold",
            FileStatus::Expired => "Expired",
            FileStatus::Scheduled => "Scheduled",
            FileStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Irreversible decision on a case file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Wire value sent to the decision endpoint
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    /// Status reached once the decision is acknowledged
    #[inline]
    #[must_use]
    pub fn target_status(&self) -> FileStatus {
        match self {
            Decision::Approve => FileStatus::Approved,
            Decision::Reject => FileStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loan application record progressing through its declared steps
///
/// Instances handed out by the orchestrator are snapshots; the orchestrator
/// owns the live record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFile {
    /// Server identifier, known after the first acknowledged submission
    pub id: Option<FileId>,
    /// Declared step order
    pub steps: Vec<Step>,
    /// Steps acknowledged by the server
    pub completed: BTreeSet<Step>,
    /// Steps verified by staff; always a subset of `completed`
    pub verified: BTreeSet<Step>,
    /// Step currently open for data collection
    pub active: Step,
    /// Review status
    pub status: FileStatus,
}

impl CaseFile {
    /// Position of a step in the declared order
    #[inline]
    #[must_use]
    pub fn position(&self, step: Step) -> Option<usize> {
        self.steps.iter().position(|s| *s == step)
    }

    /// Step declared right before `step`
    #[must_use]
    pub fn predecessor(&self, step: Step) -> Option<Step> {
        self.position(step)
            .and_then(|idx| idx.checked_sub(1))
            .map(|idx| self.steps[idx])
    }

    /// Step declared right after `step`
    #[must_use]
    pub fn successor(&self, step: Step) -> Option<Step> {
        self.position(step).and_then(|idx| self.steps.get(idx + 1).copied())
    }

    /// Whether `step` is completed
    #[inline]
    #[must_use]
    pub fn is_completed(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    /// Whether `step` is verified
    #[inline]
    #[must_use]
    pub fn is_verified(&self, step: Step) -> bool {
        self.verified.contains(&step)
    }
}
