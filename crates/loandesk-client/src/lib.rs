//! Loandesk Client - effect coordination for case files
//!
//! The runtime half of loandesk:
//! - `ApiGateway` decorates, sends and classifies every request
//! - `SessionGuard` decides where navigation lands
//! - `EffectCoordinator` runs one guarded effect script per user action
//! - `ApprovalWorkflow` puts a retyped challenge in front of decisions
//! - `NotificationHub` keeps the live notification channel
//!
//! # Example
//!
//! ```rust,ignore
//! use loandesk_client::{ClientConfig, Command, LoandeskClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LoandeskClient::from_config(ClientConfig::load("loandesk.toml")?)?;
//! client
//!     .coordinator()
//!     .dispatch(Command::Login { email: "a@acme.test".into(), password: "secret".into() })
//!     .await
//!     .into_result()?;
//!
//! let draft = client.coordinator().case_files().open_default();
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod approval;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod hub;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod transport;

pub use approval::{ApprovalForm, ApprovalWorkflow, ConfirmedDecision};
pub use client::LoandeskClient;
pub use config::{ClientConfig, DispatchMode, OrganizationFallback};
pub use coordinator::{
    CaseFileStore, Command, CommandOutput, EffectCoordinator, EntityScope, EntityState,
    EntityStore, InFlightRegistry, NoticeKind, Progress, ProgressEvent, RunOutcome,
    SurfacedError,
};
pub use error::{
    ClientError, ConfigError, FailureKind, HubError, StorageError, TransportError,
    UNEXPECTED_ERROR_MESSAGE,
};
pub use gateway::{ApiErrorBody, ApiGateway, ApiRequest, ApiResponse};
pub use guard::{NavigationOutcome, SessionGuard};
pub use hub::{
    HubEvent, InboundEvent, NotificationHub, NotificationSink, OutboundEvent, SocketConnector,
    SocketPair, WsConnector,
};
pub use navigation::{Navigation, Route};
pub use session::SessionContext;
pub use storage::{FileStore, MemoryStore, SessionStore, SESSION_KEY, TOKEN_KEY};
pub use transport::{HttpTransport, Method, PreparedRequest, RawResponse, RequestBody, Transport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a client
    pub use crate::{
        ApprovalWorkflow, ClientConfig, ClientError, Command, CommandOutput, DispatchMode,
        EffectCoordinator, FailureKind, HubEvent, LoandeskClient, RunOutcome,
    };
    pub use loandesk_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
