//! Keys identifying user actions whose effects must not overlap

use crate::case_file::{DraftId, FileId};
use crate::step::Step;
use std::fmt;

/// Identifier of one triggerable user action
///
/// Two effect scripts with equal keys never run at the same time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionKey(String);

impl ActionKey {
    /// Arbitrary key
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Submission of one step of a draft
    #[must_use]
    pub fn step(draft: DraftId, step: Step) -> Self {
        Self(format!("step:{draft}:{step}"))
    }

    /// Approve/reject of a file
    #[must_use]
    pub fn decision(file: &FileId) -> Self {
        Self(format!("decision:{file}"))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
