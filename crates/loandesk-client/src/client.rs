//! Composition root
//!
//! Builds the session, gateway, coordinator, approval workflow and hub
//! around one shared [`SessionContext`].

use crate::approval::ApprovalWorkflow;
use crate::config::ClientConfig;
use crate::coordinator::{Command, CommandOutput, EffectCoordinator, RunOutcome};
use crate::error::{ClientError, ConfigError};
use crate::gateway::ApiGateway;
use crate::guard::{NavigationOutcome, SessionGuard};
use crate::hub::{NotificationHub, SocketConnector, WsConnector};
use crate::navigation::Navigation;
use crate::session::SessionContext;
use crate::storage::{FileStore, MemoryStore, SessionStore};
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;

/// Fully wired client
#[derive(Debug, Clone)]
pub struct LoandeskClient {
    config: ClientConfig,
    session: Arc<SessionContext>,
    navigation: Arc<Navigation>,
    gateway: Arc<ApiGateway>,
    guard: SessionGuard,
    coordinator: Arc<EffectCoordinator>,
    approval: ApprovalWorkflow,
    hub: Arc<NotificationHub>,
}

impl LoandeskClient {
    /// Wire a client from explicit parts
    #[must_use]
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        connector: Arc<dyn SocketConnector>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let session = Arc::new(SessionContext::new(store));
        let navigation = Arc::new(Navigation::default());
        let gateway = Arc::new(ApiGateway::new(
            transport,
            Arc::clone(&session),
            Arc::clone(&navigation),
            config.organization_fallback,
        ));
        let guard = SessionGuard::new(Arc::clone(&session), Arc::clone(&navigation));
        let coordinator = Arc::new(EffectCoordinator::new(
            Arc::clone(&gateway),
            guard.clone(),
            config.dispatch_mode,
            config.progress_capacity,
        ));
        let approval = ApprovalWorkflow::new(Arc::clone(&coordinator), config.challenge_length);
        let hub = Arc::new(NotificationHub::new(
            connector,
            Arc::clone(&session),
            Arc::clone(&navigation),
            config.hub_capacity,
        ));

        Self {
            config,
            session,
            navigation,
            gateway,
            guard,
            coordinator,
            approval,
            hub,
        }
    }

    /// Wire a client with the HTTP transport, WebSocket connector and the
    /// configured session store
    ///
    /// # Errors
    /// - `ConfigError::Invalid` for bad values or an unusable base URL
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.api_base_url, config.request_timeout()).map_err(|e| {
            ConfigError::Invalid {
                field: "api_base_url",
                message: e.to_string(),
            }
        })?;
        let connector = WsConnector::new(&config.socket_url, config.hub_capacity);
        let store: Arc<dyn SessionStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        tracing::debug!(api = %config.api_base_url, socket = %config.socket_url, "client configured");
        Ok(Self::new(config, Arc::new(transport), Arc::new(connector), store))
    }

    /// Rehydrate a persisted session and apply the guard to the current route
    ///
    /// # Errors
    /// Storage failures
    pub fn resume(&self) -> Result<NavigationOutcome, ClientError> {
        self.guard.enforce(self.navigation.current())
    }

    /// Sign out and close the notification channel
    pub async fn logout(&self) -> RunOutcome<CommandOutput> {
        let outcome = self.coordinator.dispatch(Command::Logout).await;
        self.hub.disconnect().await;
        outcome
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    #[must_use]
    pub fn navigation(&self) -> &Arc<Navigation> {
        &self.navigation
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<ApiGateway> {
        &self.gateway
    }

    #[must_use]
    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<EffectCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn approval(&self) -> &ApprovalWorkflow {
        &self.approval
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }
}
