//! Session context shared by the gateway, the guard and the hub
//!
//! Writers hold the write lock across the storage update, so a reader never
//! observes a token without its authentication flag or the reverse.

use crate::error::StorageError;
use crate::storage::{SessionStore, SESSION_KEY, TOKEN_KEY};
use loandesk_core::SessionSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;

/// Single source of truth for the signed-in session
#[derive(Debug)]
pub struct SessionContext {
    state: RwLock<SessionSnapshot>,
    store: Arc<dyn SessionStore>,
}

impl SessionContext {
    /// Create an empty, signed-out context over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            state: RwLock::new(SessionSnapshot::default()),
            store,
        }
    }

    /// Copy of the current session
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    /// Token attached to outbound requests
    #[must_use]
    pub fn token(&self) -> Option<String> {
        let state = self.state.read();
        if state.authenticated {
            state.token.clone()
        } else {
            None
        }
    }

    #[must_use]
    pub fn employee_id(&self) -> Option<String> {
        self.state.read().employee_id.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    /// Token found in persistent storage
    ///
    /// # Errors
    /// Storage read failures
    pub fn stored_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(TOKEN_KEY)
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub(crate) fn establish(&self, snapshot: SessionSnapshot) -> Result<(), StorageError> {
        let mut state = self.state.write();
        let serialized = serde_json::to_string(&snapshot)?;
        if let Some(token) = &snapshot.token {
            self.store.set(TOKEN_KEY, token)?;
        }
        self.store.set(SESSION_KEY, &serialized)?;
        *state = SessionSnapshot {
            loading: state.loading,
            ..snapshot
        };
        Ok(())
    }

    /// Load the persisted snapshot; `false` if nothing consistent is stored
    pub(crate) fn restore(&self) -> Result<bool, StorageError> {
        let mut state = self.state.write();
        let token = self.store.get(TOKEN_KEY)?;
        let Some(raw) = self.store.get(SESSION_KEY)? else {
            return Ok(false);
        };
        let snapshot: SessionSnapshot = serde_json::from_str(&raw)?;
        if token.is_none() || snapshot.token != token || !snapshot.authenticated {
            return Ok(false);
        }
        *state = SessionSnapshot {
            loading: false,
            ..snapshot
        };
        Ok(true)
    }

    /// Drop every trace of the session, memory and storage alike
    pub(crate) fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.state.write();
        *state = SessionSnapshot::default();
        self.store.clear()
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.state.write().loading = loading;
    }

    /// Raise the loading flag until the guard drops
    pub(crate) fn loading(&self) -> SessionLoading<'_> {
        self.set_loading(true);
        SessionLoading { session: self }
    }
}

/// Clears the session loading flag on drop
pub(crate) struct SessionLoading<'a> {
    session: &'a SessionContext,
}

impl Drop for SessionLoading<'_> {
    fn drop(&mut self) {
        self.session.set_loading(false);
    }
}
