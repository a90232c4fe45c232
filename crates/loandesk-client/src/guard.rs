//! Session guard
//!
//! Decides where a navigation lands given cached credentials and the
//! in-memory session, and owns the sign-in/sign-out writes to the session.

use crate::error::ClientError;
use crate::navigation::{Navigation, Route};
use crate::session::SessionContext;
use loandesk_core::{OrganizationMembership, SessionSnapshot};
use serde_json::Value;
use std::sync::Arc;

/// Result of a navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Route may be shown as is
    Stay,
    /// No valid session
    RedirectToLogin,
    /// Signed in but on a public page or a foreign organization
    RedirectToWorkspace(String),
}

/// Gatekeeper for protected routes
#[derive(Debug, Clone)]
pub struct SessionGuard {
    session: Arc<SessionContext>,
    navigation: Arc<Navigation>,
}

impl SessionGuard {
    #[must_use]
    pub fn new(session: Arc<SessionContext>, navigation: Arc<Navigation>) -> Self {
        Self {
            session,
            navigation,
        }
    }

    /// Decide the outcome of navigating to `route`
    ///
    /// The in-memory session wins when it agrees with storage; a stored
    /// token without an in-memory session is rehydrated once.
    ///
    /// # Errors
    /// Storage failures while reading cached credentials
    pub fn check(&self, route: &Route) -> Result<NavigationOutcome, ClientError> {
        let stored = self.session.stored_token()?;
        let mut authenticated = self.session.is_authenticated();

        if authenticated && stored != self.session.token() {
            tracing::warn!("cached token disagrees with session, signing out");
            self.session.clear()?;
            authenticated = false;
        } else if !authenticated && stored.is_some() {
            authenticated = self.session.restore()?;
            if authenticated {
                tracing::info!("session restored from storage");
            } else {
                tracing::warn!("stale cached credentials discarded");
                self.session.clear()?;
            }
        }

        let snapshot = self.session.snapshot();
        let outcome = match (authenticated, route.organization_segment()) {
            (false, _) if route.is_public() => NavigationOutcome::Stay,
            (false, _) => NavigationOutcome::RedirectToLogin,
            (true, Some(organization)) if snapshot.is_member_of(organization) => {
                NavigationOutcome::Stay
            }
            (true, _) if route.as_str() == Route::NOT_FOUND => NavigationOutcome::Stay,
            (true, _) => match snapshot.default_organization() {
                Some(membership) => NavigationOutcome::RedirectToWorkspace(membership.id.clone()),
                None => NavigationOutcome::Stay,
            },
        };
        tracing::debug!(route = %route, ?outcome, "navigation checked");
        Ok(outcome)
    }

    /// Check `route` and move navigation accordingly
    ///
    /// # Errors
    /// Same as [`SessionGuard::check`]
    pub fn enforce(&self, route: Route) -> Result<NavigationOutcome, ClientError> {
        let outcome = self.check(&route)?;
        let target = match &outcome {
            NavigationOutcome::Stay => route,
            NavigationOutcome::RedirectToLogin => Route::login(),
            NavigationOutcome::RedirectToWorkspace(organization) => Route::workspace(organization),
        };
        self.navigation.navigate(target);
        Ok(outcome)
    }

    /// Install a signed-in session and land on its default workspace
    ///
    /// # Errors
    /// Storage failures while persisting the session
    pub fn establish(&self, snapshot: SessionSnapshot) -> Result<Route, ClientError> {
        let landing = snapshot
            .default_organization()
            .map_or_else(Route::not_found, |m| Route::workspace(&m.id));
        self.session.establish(SessionSnapshot {
            authenticated: true,
            ..snapshot
        })?;
        tracing::info!(
            employee = ?self.session.employee_id(),
            route = %landing,
            "signed in"
        );
        self.navigation.navigate(landing.clone());
        Ok(landing)
    }

    /// Install the session described by a login response
    ///
    /// Accepts `{token, employeeId, organizations}` with the employee id
    /// optionally nested under `employee._id`.
    ///
    /// # Errors
    /// - `ValidationFailed` if the response carries no token
    /// - storage failures while persisting
    pub fn establish_from_login(&self, data: &Value) -> Result<Route, ClientError> {
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::validation("login response carries no token"))?;

        let employee_id = data
            .get("employeeId")
            .or_else(|| data.get("employee").and_then(|e| e.get("_id")))
            .and_then(Value::as_str)
            .map(str::to_string);

        let organizations = data
            .get("organizations")
            .cloned()
            .map(serde_json::from_value::<Vec<OrganizationMembership>>)
            .transpose()
            .map_err(|e| ClientError::unexpected(format!("malformed organizations: {e}")))?
            .unwrap_or_default();

        self.establish(SessionSnapshot {
            token: Some(token.to_string()),
            employee_id,
            organizations,
            authenticated: true,
            loading: false,
        })
    }

    /// Sign out locally and return to login
    ///
    /// # Errors
    /// Storage failures while clearing
    pub fn logout(&self) -> Result<(), ClientError> {
        self.session.clear()?;
        self.navigation.navigate(Route::login());
        tracing::info!("signed out");
        Ok(())
    }

    pub(crate) fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SessionStore, TOKEN_KEY};
    use serde_json::json;

    fn guard() -> (SessionGuard, Arc<MemoryStore>, Arc<Navigation>) {
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(SessionContext::new(store.clone()));
        let navigation = Arc::new(Navigation::default());
        (SessionGuard::new(session, navigation.clone()), store, navigation)
    }

    fn login_body() -> Value {
        json!({
            "token": "tok",
            "employeeId": "E1",
            "organizations": [{"_id": "acme", "name": "Acme"}, {"id": "beta", "name": "Beta"}]
        })
    }

    #[test]
    fn signed_out_users_go_to_login() {
        let (guard, _, _) = guard();
        assert_eq!(
            guard.check(&Route::workspace("acme")).unwrap(),
            NavigationOutcome::RedirectToLogin
        );
        assert_eq!(guard.check(&Route::login()).unwrap(), NavigationOutcome::Stay);
    }

    #[test]
    fn login_lands_on_first_organization() {
        let (guard, store, navigation) = guard();
        let landing = guard.establish_from_login(&login_body()).unwrap();

        assert_eq!(landing, Route::workspace("acme"));
        assert_eq!(navigation.current(), Route::workspace("acme"));
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("tok"));
    }

    #[test]
    fn signed_in_users_leave_public_pages() {
        let (guard, _, _) = guard();
        guard.establish_from_login(&login_body()).unwrap();

        assert_eq!(
            guard.check(&Route::login()).unwrap(),
            NavigationOutcome::RedirectToWorkspace("acme".into())
        );
        assert_eq!(guard.check(&Route::new("/beta/files")).unwrap(), NavigationOutcome::Stay);
        assert_eq!(
            guard.check(&Route::new("/gamma/files")).unwrap(),
            NavigationOutcome::RedirectToWorkspace("acme".into())
        );
    }

    #[test]
    fn tampered_cache_signs_out() {
        let (guard, store, navigation) = guard();
        guard.establish_from_login(&login_body()).unwrap();
        store.set(TOKEN_KEY, "forged").unwrap();

        let outcome = guard.enforce(Route::workspace("acme")).unwrap();
        assert_eq!(outcome, NavigationOutcome::RedirectToLogin);
        assert_eq!(navigation.current(), Route::login());
        assert!(!guard.session().is_authenticated());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn restart_restores_persisted_session() {
        let (guard, store, _) = guard();
        guard.establish_from_login(&login_body()).unwrap();

        let fresh = SessionGuard::new(
            Arc::new(SessionContext::new(store)),
            Arc::new(Navigation::default()),
        );
        assert_eq!(fresh.check(&Route::workspace("acme")).unwrap(), NavigationOutcome::Stay);
        assert_eq!(fresh.session().employee_id().as_deref(), Some("E1"));
    }

    #[test]
    fn login_without_token_is_rejected() {
        let (guard, store, _) = guard();
        let err = guard.establish_from_login(&json!({"employeeId": "E1"})).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::ValidationFailed);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn logout_clears_everything() {
        let (guard, store, navigation) = guard();
        guard.establish_from_login(&login_body()).unwrap();
        guard.logout().unwrap();

        assert!(store.is_empty().unwrap());
        assert_eq!(navigation.current(), Route::login());
    }
}
