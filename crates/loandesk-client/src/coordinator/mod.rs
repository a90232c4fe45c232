//! Effect coordination
//!
//! Every user action runs as one effect script:
//! - claim the action key (drop or queue repeated triggers)
//! - raise loading on the entity scope
//! - call the gateway and interpret the answer
//! - mutate case-file or session state
//! - clear loading and surface the error, if any
//!
//! Loading is released by a drop guard, so early returns, panics and
//! cancelled futures all leave the scope idle.

mod case_files;
mod command;
mod entity;
mod registry;

pub use case_files::CaseFileStore;
pub use command::{Command, CommandOutput, NoticeKind};
pub use entity::{EntityScope, EntityState, EntityStore, LoadingGuard, SurfacedError};
pub use registry::{InFlightGuard, InFlightRegistry};

use crate::approval::ConfirmedDecision;
use crate::config::DispatchMode;
use crate::error::{ClientError, FailureKind};
use crate::gateway::{ApiGateway, ApiRequest};
use crate::guard::SessionGuard;
use crate::transport::{Method, RequestBody};
use loandesk_core::{
    ActionKey, DraftId, FileId, FileStatus, ReopenPolicy, Step, StepOrchestrator, StepOutcome,
    StepPayload,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Phase of an effect script, for toasts and progress indicators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Succeeded,
    Failed { message: String },
}

/// Progress of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub key: ActionKey,
    pub progress: Progress,
}

/// How a script ended
#[derive(Debug)]
pub enum RunOutcome<T> {
    Completed(T),
    Failed(ClientError),
    /// Same action already in flight under `DropIfBusy`
    Dropped,
}

impl<T> RunOutcome<T> {
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    #[inline]
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, RunOutcome::Dropped)
    }

    /// Completed value, if any
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::Failed(_) | RunOutcome::Dropped => None,
        }
    }

    /// Convert into a `Result`; a dropped trigger yields `Ok(None)`
    ///
    /// # Errors
    /// The script's failure
    pub fn into_result(self) -> Result<Option<T>, ClientError> {
        match self {
            RunOutcome::Completed(value) => Ok(Some(value)),
            RunOutcome::Failed(err) => Err(err),
            RunOutcome::Dropped => Ok(None),
        }
    }
}

/// Runs effect scripts for user actions
#[derive(Debug)]
pub struct EffectCoordinator {
    gateway: Arc<ApiGateway>,
    guard: SessionGuard,
    case_files: Arc<CaseFileStore>,
    entities: Arc<EntityStore>,
    registry: Arc<InFlightRegistry>,
    progress: broadcast::Sender<ProgressEvent>,
    mode: DispatchMode,
}

impl EffectCoordinator {
    #[must_use]
    pub fn new(
        gateway: Arc<ApiGateway>,
        guard: SessionGuard,
        mode: DispatchMode,
        progress_capacity: usize,
    ) -> Self {
        let (progress, _) = broadcast::channel(progress_capacity.max(1));
        Self {
            gateway,
            guard,
            case_files: Arc::new(CaseFileStore::new()),
            entities: Arc::new(EntityStore::new()),
            registry: Arc::new(InFlightRegistry::new()),
            progress,
            mode,
        }
    }

    /// Case files tracked by this client
    #[inline]
    #[must_use]
    pub fn case_files(&self) -> &CaseFileStore {
        &self.case_files
    }

    /// Loading and error state per scope
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Follow pending/success/failure phases of every script
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Run `command` under the configured dispatch mode
    pub async fn dispatch(&self, command: Command) -> RunOutcome<CommandOutput> {
        self.dispatch_with(command, self.mode).await
    }

    /// Run `command` under an explicit dispatch mode
    pub async fn dispatch_with(&self, command: Command, mode: DispatchMode) -> RunOutcome<CommandOutput> {
        let key = command.action_key();
        let scope = command.scope();
        self.run(key, scope, mode, self.execute(command)).await
    }

    /// Run one effect script
    ///
    /// `script` is not polled unless the key is acquired. Global failures
    /// (401, 406) were already handled by the gateway and are not written
    /// to the scope.
    pub async fn run<T, F>(
        &self,
        key: ActionKey,
        scope: EntityScope,
        mode: DispatchMode,
        script: F,
    ) -> RunOutcome<T>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let Some(_in_flight) = self.registry.acquire(&key, mode).await else {
            tracing::warn!(action = %key, "action already in flight, trigger dropped");
            return RunOutcome::Dropped;
        };

        self.emit(&key, Progress::Pending);
        tracing::debug!(action = %key, %scope, "effect script started");

        let result = {
            let _loading = self.entities.begin(scope.clone());
            script.await
        };

        match result {
            Ok(value) => {
                tracing::info!(action = %key, "effect script succeeded");
                self.emit(&key, Progress::Succeeded);
                RunOutcome::Completed(value)
            }
            Err(err) => {
                if err.is_global() {
                    tracing::warn!(action = %key, kind = %err.kind(), "effect script ended by global reaction");
                } else {
                    if err.kind() == FailureKind::UnexpectedError {
                        tracing::error!(action = %key, error = %err, "effect script failed");
                    } else {
                        tracing::warn!(action = %key, error = %err, "effect script failed");
                    }
                    self.surface_local(scope, &err);
                }
                self.emit(
                    &key,
                    Progress::Failed {
                        message: err.user_message(),
                    },
                );
                RunOutcome::Failed(err)
            }
        }
    }

    /// Reopen a decided case file if `policy` allows `actor`
    ///
    /// # Errors
    /// - `ReopenDenied` wrapped as a validation failure
    /// - unknown draft
    pub fn reopen(
        &self,
        draft: DraftId,
        policy: &dyn ReopenPolicy,
        actor: &str,
    ) -> Result<FileStatus, ClientError> {
        let result = self.case_files.with_mut(draft, |o| o.reopen(policy, actor));
        if let Err(err) = &result {
            self.surface_local(EntityScope::CaseFile(draft), err);
        }
        result
    }

    pub(crate) fn surface_local(&self, scope: EntityScope, err: &ClientError) {
        self.entities.set_error(scope, SurfacedError::from(err));
    }

    fn emit(&self, key: &ActionKey, progress: Progress) {
        // no subscribers is fine
        self.progress
            .send(ProgressEvent {
                key: key.clone(),
                progress,
            })
            .ok();
    }

    async fn execute(&self, command: Command) -> Result<CommandOutput, ClientError> {
        match command {
            Command::Login { email, password } => {
                let _loading = self.guard.session().loading();
                let data = self
                    .gateway
                    .call(
                        ApiRequest::post("/auth/login", json!({ "email": email, "password": password }))
                            .unscoped(),
                    )
                    .await
                    .into_json()?;
                let landing = self.guard.establish_from_login(&data)?;
                Ok(CommandOutput::SignedIn { landing })
            }
            Command::ForgotPassword { email } => {
                self.gateway
                    .call(ApiRequest::post("/auth/forgot-password", json!({ "email": email })).unscoped())
                    .await
                    .into_json()?;
                Ok(CommandOutput::ResetRequested)
            }
            Command::Logout => {
                self.guard.logout()?;
                Ok(CommandOutput::SignedOut)
            }
            Command::SubmitStep {
                draft,
                step,
                payload,
            } => self.submit_step(draft, step, payload).await,
            Command::ActivateStep { draft, step } => {
                let transition = self.case_files.with_mut(draft, |o| o.activate(step))?;
                Ok(CommandOutput::StepActivated(transition))
            }
            Command::VerifyStep { draft, step } => {
                let newly = self.case_files.with_mut(draft, |o| o.verify(step))?;
                Ok(CommandOutput::StepVerified { newly })
            }
            Command::FetchCibilScore { file_id } => {
                let path = format!("/customer-file/file-operations/{file_id}/cibil-score");
                let data = self.gateway.call(ApiRequest::post(path, json!({}))).await.into_json()?;
                Ok(CommandOutput::CibilScore(data))
            }
            Command::Decide(decision) => self.decide(decision).await,
            Command::FetchDashboard => {
                let data = self
                    .gateway
                    .call(ApiRequest::get("/collection/dashboard"))
                    .await
                    .into_json()?;
                Ok(CommandOutput::Dashboard(data))
            }
            Command::EditNotice { kind, body } => {
                let path = format!("/collection/edit-{kind}");
                let bytes = self.gateway.call(ApiRequest::post(path, body)).await.into_binary()?;
                tracing::info!(notice = %kind, size = bytes.len(), "notice generated");
                Ok(CommandOutput::Notice(bytes))
            }
            Command::FetchLedger => {
                let data = self.gateway.call(ApiRequest::get("/client-ledger")).await.into_json()?;
                Ok(CommandOutput::Ledger(data))
            }
            Command::UpdateLedger { body } => {
                let data = self
                    .gateway
                    .call(ApiRequest::put("/client-ledger", body))
                    .await
                    .into_json()?;
                Ok(CommandOutput::Ledger(data))
            }
            Command::FetchOrganizationConfig { organization } => {
                let path = format!("/organization-configs/{organization}/configs");
                let data = self.gateway.call(ApiRequest::get(path)).await.into_json()?;
                Ok(CommandOutput::OrganizationConfig(data))
            }
            Command::FetchQuestions => {
                let data = self.gateway.call(ApiRequest::get("/question")).await.into_json()?;
                Ok(CommandOutput::Questions(data))
            }
            Command::CreateQuestion { body } => {
                let data = self.gateway.call(ApiRequest::post("/question", body)).await.into_json()?;
                Ok(CommandOutput::QuestionSaved(data))
            }
            Command::UpdateQuestion { body } => {
                let data = self.gateway.call(ApiRequest::put("/question", body)).await.into_json()?;
                Ok(CommandOutput::QuestionSaved(data))
            }
        }
    }

    async fn submit_step(
        &self,
        draft: DraftId,
        step: Step,
        payload: StepPayload,
    ) -> Result<CommandOutput, ClientError> {
        let (file_id, resubmission, is_first) = self.case_files.with(draft, |o| {
            o.can_submit(step)?;
            let file = o.case_file();
            Ok((file.id.clone(), file.is_completed(step), file.steps.first() == Some(&step)))
        })?;

        let segment = step.segment();
        let (method, path) = match (&file_id, resubmission) {
            (None, _) if is_first => (Method::Post, format!("/customer-file/{segment}")),
            (None, _) => {
                return Err(ClientError::validation(format!(
                    "step '{step}' needs a case file; submit the first step before it"
                )))
            }
            (Some(id), false) => (Method::Post, format!("/customer-file/{segment}/{id}")),
            (Some(id), true) => (Method::Put, format!("/customer-file/{segment}/{id}")),
        };

        let request = if payload.is_multipart() {
            ApiRequest::multipart(method, path, payload.fields, payload.attachments)
        } else {
            ApiRequest::new(method, path, RequestBody::Json(Value::Object(payload.fields)))
        };

        let response = self.gateway.call(request).await.into_json().and_then(|data| {
            let assigned = extract_file_id(&data);
            if file_id.is_none() && assigned.is_none() {
                return Err(ClientError::unexpected(format!(
                    "server accepted step '{step}' but assigned no file id"
                )));
            }
            Ok(assigned)
        });

        match response {
            Ok(assigned) => {
                let transition = self
                    .case_files
                    .with_mut(draft, |o| o.advance(step, &StepOutcome::success(assigned)))?;
                let file_id = self.case_files.snapshot(draft).and_then(|file| file.id);
                Ok(CommandOutput::StepSubmitted { transition, file_id })
            }
            Err(err) => {
                let stayed = self
                    .case_files
                    .with_mut(draft, |o| o.advance(step, &StepOutcome::failure()));
                tracing::debug!(%step, ?stayed, "submission rejected");
                Err(err)
            }
        }
    }

    async fn decide(&self, confirmed: ConfirmedDecision) -> Result<CommandOutput, ClientError> {
        let file_id = confirmed.file_id().clone();
        let decision = confirmed.decision();
        let tracked = self.case_files.find_by_file_id(&file_id);
        if let Some(draft) = tracked {
            self.case_files.with(draft, StepOrchestrator::can_decide)?;
        }
        let body = json!({
            "fileId": file_id,
            "decision": decision.as_str(),
            "remarks": confirmed.remarks(),
        });
        self.gateway
            .call(ApiRequest::post(format!("/loans/{file_id}/approve"), body))
            .await
            .into_json()?;

        let status = match tracked {
            Some(draft) => {
                if let Err(err) = self.case_files.with_mut(draft, |o| o.decide(decision)) {
                    // decided concurrently while the request was in flight
                    tracing::warn!(%file_id, error = %err, "decision accepted but local file already decided");
                }
                self.case_files.snapshot(draft).map(|file| file.status)
            }
            None => None,
        };
        tracing::info!(%file_id, %decision, "decision recorded");
        Ok(CommandOutput::Decided {
            file_id,
            decision,
            status,
        })
    }
}

/// Server-assigned file identifier in a step response
fn extract_file_id(data: &Value) -> Option<FileId> {
    ["_id", "fileId", "id"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(FileId::from)
}
