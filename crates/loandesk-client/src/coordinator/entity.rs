//! Entity-scoped loading and error state
//!
//! What the screens read: per scope, whether a script is running and the
//! last failure it surfaced.

use crate::error::{ClientError, FailureKind};
use dashmap::DashMap;
use loandesk_core::{DraftId, FileId};
use std::collections::BTreeMap;
use std::fmt;

/// Slice of UI state an effect script reports into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityScope {
    Auth,
    CaseFile(DraftId),
    Decision(FileId),
    CibilScore(FileId),
    Dashboard,
    Ledger,
    Notice,
    OrganizationConfig,
    Questions,
}

impl fmt::Display for EntityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityScope::Auth => f.write_str("auth"),
            EntityScope::CaseFile(draft) => write!(f, "case-file:{draft}"),
            EntityScope::Decision(file) => write!(f, "decision:{file}"),
            EntityScope::CibilScore(file) => write!(f, "cibil-score:{file}"),
            EntityScope::Dashboard => f.write_str("dashboard"),
            EntityScope::Ledger => f.write_str("ledger"),
            EntityScope::Notice => f.write_str("notice"),
            EntityScope::OrganizationConfig => f.write_str("organization-config"),
            EntityScope::Questions => f.write_str("questions"),
        }
    }
}

/// Failure as shown next to the triggering form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfacedError {
    pub kind: FailureKind,
    pub message: String,
    pub field_errors: BTreeMap<String, String>,
}

impl From<&ClientError> for SurfacedError {
    fn from(err: &ClientError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
            field_errors: err.field_errors(),
        }
    }
}

/// State of one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityState {
    pub loading: bool,
    pub error: Option<SurfacedError>,
}

/// All scopes
#[derive(Debug, Default)]
pub struct EntityStore {
    states: DashMap<EntityScope, EntityState>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a scope's state; untouched scopes are idle and clean
    #[must_use]
    pub fn state(&self, scope: &EntityScope) -> EntityState {
        self.states
            .get(scope)
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_loading(&self, scope: &EntityScope) -> bool {
        self.states.get(scope).is_some_and(|state| state.loading)
    }

    #[must_use]
    pub fn error(&self, scope: &EntityScope) -> Option<SurfacedError> {
        self.states.get(scope).and_then(|state| state.error.clone())
    }

    /// Raise loading for `scope` and clear its previous error
    pub(crate) fn begin(&self, scope: EntityScope) -> LoadingGuard<'_> {
        {
            let mut state = self.states.entry(scope.clone()).or_default();
            state.loading = true;
            state.error = None;
        }
        LoadingGuard { store: self, scope }
    }

    pub(crate) fn set_error(&self, scope: EntityScope, error: SurfacedError) {
        tracing::debug!(%scope, kind = %error.kind, "error surfaced");
        self.states.entry(scope).or_default().error = Some(error);
    }

    /// Dismiss the error shown for `scope`
    pub fn clear_error(&self, scope: &EntityScope) {
        if let Some(mut state) = self.states.get_mut(scope) {
            state.error = None;
        }
    }

    fn finish(&self, scope: &EntityScope) {
        if let Some(mut state) = self.states.get_mut(scope) {
            state.loading = false;
        }
    }
}

/// Clears the scope's loading flag on drop, whatever way the script ends
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    store: &'a EntityStore,
    scope: EntityScope,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.finish(&self.scope);
    }
}
