//! Case files held by the client
//!
//! Snapshots are public; mutation goes through the coordinator only.

use crate::error::ClientError;
use dashmap::DashMap;
use loandesk_core::{CaseFile, DraftId, FileId, OrchestratorError, Step, StepOrchestrator};

/// Drafts and their orchestrators
#[derive(Debug, Default)]
pub struct CaseFileStore {
    files: DashMap<DraftId, StepOrchestrator>,
}

impl CaseFileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a draft over `steps`
    ///
    /// # Errors
    /// `InvalidSequence` for an empty or repeating sequence
    pub fn open(&self, steps: Vec<Step>) -> Result<DraftId, OrchestratorError> {
        let orchestrator = StepOrchestrator::new(steps)?;
        Ok(self.insert(orchestrator))
    }

    /// Start a draft over every step
    #[must_use]
    pub fn open_default(&self) -> DraftId {
        self.insert(StepOrchestrator::with_default_sequence())
    }

    /// Track a case file fetched from the server
    ///
    /// # Errors
    /// Any invariant violation found by [`StepOrchestrator::from_case_file`]
    pub fn load(&self, file: CaseFile) -> Result<DraftId, OrchestratorError> {
        let orchestrator = StepOrchestrator::from_case_file(file)?;
        Ok(self.insert(orchestrator))
    }

    /// Copy of a draft's case file
    #[must_use]
    pub fn snapshot(&self, draft: DraftId) -> Option<CaseFile> {
        self.files.get(&draft).map(|o| o.case_file().clone())
    }

    /// Draft holding the server file `id`
    #[must_use]
    pub fn find_by_file_id(&self, id: &FileId) -> Option<DraftId> {
        self.files
            .iter()
            .find(|entry| entry.case_file().id.as_ref() == Some(id))
            .map(|entry| *entry.key())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read a draft's orchestrator
    pub(crate) fn with<T>(
        &self,
        draft: DraftId,
        f: impl FnOnce(&StepOrchestrator) -> Result<T, OrchestratorError>,
    ) -> Result<T, ClientError> {
        let orchestrator = self.files.get(&draft).ok_or_else(|| unknown_draft(draft))?;
        Ok(f(&*orchestrator)?)
    }

    /// Mutate a draft's orchestrator; the shard lock is held for `f` only
    pub(crate) fn with_mut<T>(
        &self,
        draft: DraftId,
        f: impl FnOnce(&mut StepOrchestrator) -> Result<T, OrchestratorError>,
    ) -> Result<T, ClientError> {
        let mut orchestrator = self.files.get_mut(&draft).ok_or_else(|| unknown_draft(draft))?;
        Ok(f(&mut *orchestrator)?)
    }

    fn insert(&self, orchestrator: StepOrchestrator) -> DraftId {
        let draft = DraftId::new();
        tracing::debug!(%draft, active = %orchestrator.active_step(), "case file tracked");
        self.files.insert(draft, orchestrator);
        draft
    }
}

fn unknown_draft(draft: DraftId) -> ClientError {
    ClientError::validation(format!("unknown case file draft {draft}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loandesk_core::StepOutcome;

    #[test]
    fn lookup_by_server_id() {
        let store = CaseFileStore::new();
        let draft = store.open_default();
        store
            .with_mut(draft, |o| {
                o.advance(Step::Customer, &StepOutcome::success(Some(FileId::from("F100"))))
            })
            .unwrap();

        assert_eq!(store.find_by_file_id(&FileId::from("F100")), Some(draft));
        assert_eq!(store.find_by_file_id(&FileId::from("F200")), None);
    }

    #[test]
    fn unknown_draft_is_a_validation_failure() {
        let store = CaseFileStore::new();
        let err = store.with(DraftId::new(), |o| Ok(o.active_step())).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::ValidationFailed);
    }

    #[test]
    fn custom_sequences_are_validated() {
        let store = CaseFileStore::new();
        assert!(store.open(vec![]).is_err());
        let draft = store.open(vec![Step::Income, Step::Bank]).unwrap();
        assert_eq!(store.snapshot(draft).unwrap().active, Step::Income);
    }
}
