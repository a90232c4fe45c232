//! Step orchestration state machine
//!
//! States are the declared steps plus the terminal statuses Approved and
//! Rejected. A step becomes active only once its predecessor is completed,
//! and verification requires completion. Completion is a set insertion, so
//! repeated or late acknowledgments leave the file unchanged.

use crate::case_file::{CaseFile, Decision, FileStatus};
use crate::error::OrchestratorError;
use crate::step::{Step, StepOutcome};
use std::collections::BTreeSet;

/// External authority deciding whether a terminal file may be reopened
#[cfg_attr(test, mockall::automock)]
pub trait ReopenPolicy: Send + Sync {
    /// Whether `actor` may reopen `file`
    fn may_reopen(&self, file: &CaseFile, actor: &str) -> bool;
}

/// Effect of an accepted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Active step moved forward after an acknowledged submission
    Advanced { from: Step, to: Step },
    /// Last declared step completed
    Finished { step: Step },
    /// Completion recorded for a step that was no longer active
    Recorded { step: Step },
    /// Submission failed; nothing changed
    Stayed { step: Step },
    /// User navigated between reachable steps
    Moved { from: Step, to: Step },
}

/// Owner of one case file's progress state
#[derive(Debug, Clone)]
pub struct StepOrchestrator {
    file: CaseFile,
}

impl StepOrchestrator {
    /// Create an orchestrator over a declared step sequence
    ///
    /// # Errors
    /// - `OrchestratorError::InvalidSequence` if `steps` is empty or repeats a step
    pub fn new(steps: Vec<Step>) -> Result<Self, OrchestratorError> {
        validate_sequence(&steps)?;
        let active = steps[0];
        Ok(Self {
            file: CaseFile {
                id: None,
                steps,
                completed: BTreeSet::new(),
                verified: BTreeSet::new(),
                active,
                status: FileStatus::Pending,
            },
        })
    }

    /// Create an orchestrator over all steps in default order
    #[must_use]
    pub fn with_default_sequence() -> Self {
        let active = Step::ALL[0];
        Self {
            file: CaseFile {
                id: None,
                steps: Step::ALL.to_vec(),
                completed: BTreeSet::new(),
                verified: BTreeSet::new(),
                active,
                status: FileStatus::Pending,
            },
        }
    }

    /// Rehydrate from a case file fetched elsewhere, checking its invariants
    ///
    /// # Errors
    /// - `InvalidSequence` for a bad declared order
    /// - `UnknownStep` if the active, completed or verified steps are undeclared
    /// - `InvalidTransition` if a verified step is not completed
    pub fn from_case_file(file: CaseFile) -> Result<Self, OrchestratorError> {
        validate_sequence(&file.steps)?;
        if file.position(file.active).is_none() {
            return Err(OrchestratorError::UnknownStep(file.active));
        }
        if let Some(step) = file
            .completed
            .iter()
            .chain(file.verified.iter())
            .find(|s| file.position(**s).is_none())
        {
            return Err(OrchestratorError::UnknownStep(*step));
        }
        if let Some(step) = file.verified.difference(&file.completed).next() {
            return Err(OrchestratorError::invalid_transition(
                file.active,
                *step,
                "verified step is not completed",
            ));
        }
        let orchestrator = Self { file };
        orchestrator.ensure_reachable(orchestrator.file.active)?;
        Ok(orchestrator)
    }

    /// Snapshot of the case file
    #[inline]
    #[must_use]
    pub fn case_file(&self) -> &CaseFile {
        &self.file
    }

    /// Step currently open
    #[inline]
    #[must_use]
    pub fn active_step(&self) -> Step {
        self.file.active
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> FileStatus {
        self.file.status
    }

    /// Whether every declared step is completed
    #[must_use]
    pub fn is_collection_complete(&self) -> bool {
        self.file.steps.iter().all(|s| self.file.completed.contains(s))
    }

    /// Apply a submission outcome for `current`
    ///
    /// On success `current` joins the completed set and, if it is the
    /// active step, the cursor moves to its successor.
    ///
    /// # Errors
    /// - `Terminal` if the file is approved or rejected
    /// - `UnknownStep` if `current` is not declared
    /// - `InvalidTransition` if the predecessor of `current` is not completed
    pub fn advance(
        &mut self,
        current: Step,
        outcome: &StepOutcome,
    ) -> Result<Transition, OrchestratorError> {
        self.ensure_open()?;
        self.ensure_reachable(current)?;

        if !outcome.success {
            tracing::debug!(step = %current, "submission failed, active step unchanged");
            return Ok(Transition::Stayed {
                step: self.file.active,
            });
        }

        if self.file.id.is_none() {
            if let Some(id) = &outcome.file_id {
                tracing::info!(file_id = %id, "case file created");
                self.file.id = Some(id.clone());
            }
        }

        self.file.completed.insert(current);

        let transition = if self.file.active == current {
            match self.file.successor(current) {
                Some(next) => {
                    self.file.active = next;
                    Transition::Advanced {
                        from: current,
                        to: next,
                    }
                }
                None => Transition::Finished { step: current },
            }
        } else {
            Transition::Recorded { step: current }
        };

        if self.is_collection_complete() && self.file.status == FileStatus::Pending {
            self.file.status = FileStatus::UnderReview;
            tracing::info!("all steps collected, case file under review");
        }

        tracing::info!(step = %current, ?transition, "step completed");
        Ok(transition)
    }

    /// Check that a submission for `step` could be accepted
    ///
    /// # Errors
    /// Same as `advance` for a successful outcome.
    pub fn can_submit(&self, step: Step) -> Result<(), OrchestratorError> {
        self.ensure_open()?;
        self.ensure_reachable(step)
    }

    /// Check that a decision could be recorded
    ///
    /// # Errors
    /// - `Terminal` if a decision was already recorded
    pub fn can_decide(&self) -> Result<(), OrchestratorError> {
        self.ensure_open()
    }

    /// Open `step` for editing
    ///
    /// # Errors
    /// - `Terminal`, `UnknownStep`, or `InvalidTransition` when the
    ///   predecessor of `step` is not completed
    pub fn activate(&mut self, step: Step) -> Result<Transition, OrchestratorError> {
        self.ensure_open()?;
        self.ensure_reachable(step)?;
        let from = self.file.active;
        self.file.active = step;
        Ok(Transition::Moved { from, to: step })
    }

    /// Mark a completed step as verified
    ///
    /// Returns `false` if it was already verified.
    ///
    /// # Errors
    /// - `InvalidTransition` if `step` is not completed
    pub fn verify(&mut self, step: Step) -> Result<bool, OrchestratorError> {
        self.ensure_open()?;
        if self.file.position(step).is_none() {
            return Err(OrchestratorError::UnknownStep(step));
        }
        if !self.file.is_completed(step) {
            return Err(OrchestratorError::invalid_transition(
                self.file.active,
                step,
                "cannot verify a step that is not completed",
            ));
        }
        let inserted = self.file.verified.insert(step);
        if inserted {
            tracing::info!(step = %step, "step verified");
        }
        Ok(inserted)
    }

    /// Record an approve/reject decision
    ///
    /// # Errors
    /// - `Terminal` if a decision was already recorded
    pub fn decide(&mut self, decision: Decision) -> Result<FileStatus, OrchestratorError> {
        self.ensure_open()?;
        let previous = self.file.status;
        self.file.status = decision.target_status();
        tracing::info!(%decision, from = %previous, "decision recorded");
        Ok(previous)
    }

    /// Change a non-terminal status
    ///
    /// # Errors
    /// - `Terminal` if the file is approved or rejected
    /// - `DecisionRequired` if `status` is Approved or Rejected
    pub fn set_status(&mut self, status: FileStatus) -> Result<(), OrchestratorError> {
        self.ensure_open()?;
        if status.is_terminal() {
            return Err(OrchestratorError::DecisionRequired(status));
        }
        self.file.status = status;
        Ok(())
    }

    /// Reopen a terminal file; a no-op on open files
    ///
    /// # Errors
    /// - `ReopenDenied` if the policy refuses `actor`
    pub fn reopen(
        &mut self,
        policy: &dyn ReopenPolicy,
        actor: &str,
    ) -> Result<FileStatus, OrchestratorError> {
        if !self.file.status.is_terminal() {
            return Ok(self.file.status);
        }
        if !policy.may_reopen(&self.file, actor) {
            tracing::warn!(actor, "reopen denied");
            return Err(OrchestratorError::ReopenDenied {
                actor: actor.to_string(),
            });
        }
        self.file.status = FileStatus::UnderReview;
        tracing::info!(actor, "case file reopened");
        Ok(self.file.status)
    }

    fn ensure_open(&self) -> Result<(), OrchestratorError> {
        if self.file.status.is_terminal() {
            return Err(OrchestratorError::Terminal {
                status: self.file.status,
            });
        }
        Ok(())
    }

    fn ensure_reachable(&self, step: Step) -> Result<(), OrchestratorError> {
        if self.file.position(step).is_none() {
            return Err(OrchestratorError::UnknownStep(step));
        }
        match self.file.predecessor(step) {
            Some(prev) if !self.file.is_completed(prev) => Err(OrchestratorError::invalid_transition(
                self.file.active,
                step,
                format!("predecessor '{prev}' is not completed"),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for StepOrchestrator {
    fn default() -> Self {
        Self::with_default_sequence()
    }
}

fn validate_sequence(steps: &[Step]) -> Result<(), OrchestratorError> {
    if steps.is_empty() {
        return Err(OrchestratorError::InvalidSequence("no steps declared".to_string()));
    }
    let mut seen = BTreeSet::new();
    for step in steps {
        if !seen.insert(*step) {
            return Err(OrchestratorError::InvalidSequence(format!(
                "step '{step}' declared twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case_file::FileId;
    use pretty_assertions::assert_eq;

    fn ok() -> StepOutcome {
        StepOutcome::success(None)
    }

    #[test]
    fn starts_on_first_declared_step() {
        let orchestrator = StepOrchestrator::new(vec![Step::Income, Step::Bank]).unwrap();
        assert_eq!(orchestrator.active_step(), Step::Income);
        assert_eq!(orchestrator.status(), FileStatus::Pending);
    }

    #[test]
    fn rejects_bad_sequences() {
        assert!(matches!(
            StepOrchestrator::new(vec![]),
            Err(OrchestratorError::InvalidSequence(_))
        ));
        assert!(matches!(
            StepOrchestrator::new(vec![Step::Bank, Step::Bank]),
            Err(OrchestratorError::InvalidSequence(_))
        ));
    }

    #[test]
    fn successful_customer_submission_moves_to_address() {
        let mut orchestrator = StepOrchestrator::default();
        let transition = orchestrator
            .advance(Step::Customer, &StepOutcome::success(Some(FileId::from("F100"))))
            .unwrap();

        assert_eq!(
            transition,
            Transition::Advanced {
                from: Step::Customer,
                to: Step::Address
            }
        );
        assert_eq!(orchestrator.active_step(), Step::Address);
        assert_eq!(
            orchestrator.case_file().completed,
            BTreeSet::from([Step::Customer])
        );
        assert_eq!(orchestrator.case_file().id, Some(FileId::from("F100")));
    }

    #[test]
    fn failed_submission_keeps_state() {
        let mut orchestrator = StepOrchestrator::default();
        let before = orchestrator.case_file().clone();
        let transition = orchestrator.advance(Step::Customer, &StepOutcome::failure()).unwrap();

        assert_eq!(transition, Transition::Stayed { step: Step::Customer });
        assert_eq!(orchestrator.case_file(), &before);
    }

    #[test]
    fn skipping_a_step_is_invalid() {
        let mut orchestrator = StepOrchestrator::default();
        let err = orchestrator.advance(Step::Address, &ok()).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));

        orchestrator.advance(Step::Customer, &ok()).unwrap();
        let err = orchestrator.activate(Step::Income).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { to: Step::Income, .. }));
    }

    #[test]
    fn duplicate_completion_is_idempotent() {
        let mut orchestrator = StepOrchestrator::default();
        orchestrator.advance(Step::Customer, &ok()).unwrap();
        orchestrator.advance(Step::Address, &ok()).unwrap();
        let snapshot = orchestrator.case_file().clone();

        let late = orchestrator.advance(Step::Customer, &ok()).unwrap();
        assert_eq!(late, Transition::Recorded { step: Step::Customer });
        assert_eq!(orchestrator.case_file(), &snapshot);
    }

    #[test]
    fn first_file_id_wins() {
        let mut orchestrator = StepOrchestrator::default();
        orchestrator
            .advance(Step::Customer, &StepOutcome::success(Some("F1".into())))
            .unwrap();
        orchestrator
            .advance(Step::Address, &StepOutcome::success(Some("F2".into())))
            .unwrap();
        assert_eq!(orchestrator.case_file().id, Some(FileId::from("F1")));
    }

    #[test]
    fn verify_requires_completion() {
        let mut orchestrator = StepOrchestrator::default();
        let err = orchestrator.verify(Step::Customer).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));

        orchestrator.advance(Step::Customer, &ok()).unwrap();
        assert!(orchestrator.verify(Step::Customer).unwrap());
        assert!(!orchestrator.verify(Step::Customer).unwrap());
        assert!(orchestrator.case_file().is_verified(Step::Customer));
    }

    #[test]
    fn last_step_finishes_and_moves_to_review() {
        let mut orchestrator = StepOrchestrator::new(vec![Step::Customer, Step::Bank]).unwrap();
        orchestrator.advance(Step::Customer, &ok()).unwrap();
        let transition = orchestrator.advance(Step::Bank, &ok()).unwrap();

        assert_eq!(transition, Transition::Finished { step: Step::Bank });
        assert_eq!(orchestrator.active_step(), Step::Bank);
        assert_eq!(orchestrator.status(), FileStatus::UnderReview);
        assert!(orchestrator.is_collection_complete());
    }

    #[test]
    fn decisions_are_terminal() {
        let mut orchestrator = StepOrchestrator::default();
        assert!(orchestrator.can_decide().is_ok());
        orchestrator.decide(Decision::Approve).unwrap();

        assert!(orchestrator.can_decide().unwrap_err().is_terminal());
        assert!(orchestrator.advance(Step::Customer, &ok()).unwrap_err().is_terminal());
        assert!(orchestrator.decide(Decision::Reject).unwrap_err().is_terminal());
        assert!(orchestrator.set_status(FileStatus::OnHold).unwrap_err().is_terminal());
    }

    #[test]
    fn set_status_refuses_decision_statuses() {
        let mut orchestrator = StepOrchestrator::default();
        orchestrator.set_status(FileStatus::Scheduled).unwrap();
        assert_eq!(
            orchestrator.set_status(FileStatus::Rejected),
            Err(OrchestratorError::DecisionRequired(FileStatus::Rejected))
        );
    }

    #[test]
    fn reopen_consults_policy() {
        let mut orchestrator = StepOrchestrator::default();
        orchestrator.decide(Decision::Reject).unwrap();

        let mut deny = MockReopenPolicy::new();
        deny.expect_may_reopen().times(1).return_const(false);
        assert!(matches!(
            orchestrator.reopen(&deny, "clerk"),
            Err(OrchestratorError::ReopenDenied { .. })
        ));

        let mut allow = MockReopenPolicy::new();
        allow
            .expect_may_reopen()
            .withf(|file, actor| file.status == FileStatus::Rejected && actor == "manager")
            .times(1)
            .return_const(true);
        assert_eq!(orchestrator.reopen(&allow, "manager"), Ok(FileStatus::UnderReview));
        assert!(orchestrator.advance(Step::Customer, &ok()).is_ok());
    }

    #[test]
    fn rehydration_checks_verified_subset() {
        let mut file = StepOrchestrator::default().case_file().clone();
        file.verified.insert(Step::Customer);
        assert!(matches!(
            StepOrchestrator::from_case_file(file),
            Err(OrchestratorError::InvalidTransition { .. })
        ));
    }
}
