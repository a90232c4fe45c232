//! Error types for the client
//!
//! Every failure an effect script can meet is classified into a
//! [`FailureKind`]. Only `AuthExpired` and `AccessDenied` have global
//! reactions; everything else stays on the screen that triggered it.

use loandesk_core::OrchestratorError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Message shown when a failure has no usable description
pub const UNEXPECTED_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// HTTP 401, session is gone
    AuthExpired,
    /// HTTP 406, resource is out of reach for this organization
    AccessDenied,
    /// Field-level problems reported by the server or caught locally
    ValidationFailed,
    /// Retyped challenge did not match
    ConfirmationMismatch,
    /// No response received
    TransientNetworkError,
    /// Anything else
    UnexpectedError,
}

impl FailureKind {
    /// Classify an HTTP outcome; `None` means no response arrived
    #[must_use]
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            None => Self::TransientNetworkError,
            Some(401) => Self::AuthExpired,
            Some(406) => Self::AccessDenied,
            Some(400 | 409 | 422) => Self::ValidationFailed,
            Some(_) => Self::UnexpectedError,
        }
    }

    /// Whether the failure triggers navigation outside the current screen
    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::AccessDenied)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthExpired => "auth expired",
            Self::AccessDenied => "access denied",
            Self::ValidationFailed => "validation failed",
            Self::ConfirmationMismatch => "confirmation mismatch",
            Self::TransientNetworkError => "network error",
            Self::UnexpectedError => "unexpected error",
        };
        f.write_str(name)
    }
}

/// Main client error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Request reached the gateway and failed
    #[error("{kind}: {message}")]
    Api {
        kind: FailureKind,
        /// HTTP status, if a response arrived
        status: Option<u16>,
        message: String,
        /// Per-field messages for inline display
        field_errors: BTreeMap<String, String>,
    },

    /// Confirmation text differs from the displayed challenge
    #[error("confirmation text does not match the challenge")]
    ConfirmationMismatch,

    /// Case-file state machine refused the transition
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// Persisted session could not be read or written
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Notification channel failure
    #[error("notification channel error: {0}")]
    Hub(#[from] HubError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Local validation failure, never sent over the network
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Api {
            kind: FailureKind::ValidationFailed,
            status: None,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Catch-all failure
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Api {
            kind: FailureKind::UnexpectedError,
            status: None,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Classification of this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::ConfirmationMismatch => FailureKind::ConfirmationMismatch,
            Self::Orchestrator(_) => FailureKind::ValidationFailed,
            Self::Hub(HubError::ConnectFailed(_) | HubError::ChannelClosed) => {
                FailureKind::TransientNetworkError
            }
            Self::Storage(_) | Self::Hub(_) | Self::Config(_) => FailureKind::UnexpectedError,
        }
    }

    /// Whether the gateway already reacted globally to this failure
    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.kind().is_global()
    }

    /// Transient network errors may be retried by the user
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::TransientNetworkError
    }

    /// Per-field messages, empty unless the server sent some
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Api { field_errors, .. } => field_errors.clone(),
            _ => BTreeMap::new(),
        }
    }

    /// Message suitable for display next to the triggering form
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } if !message.is_empty() => message.clone(),
            Self::Api { .. } | Self::Storage(_) | Self::Config(_) => {
                UNEXPECTED_ERROR_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Transport-level failures: no usable HTTP response
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection or protocol failure
    #[error("request failed: {0}")]
    Request(String),

    /// Transport timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Session storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO error on the backing file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored value is not valid JSON
    #[error("corrupt session data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StorageError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Notification channel errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// Duplex connection could not be established
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Connection dropped while sending
    #[error("channel closed")]
    ChannelClosed,

    /// Join requires an employee and an organization
    #[error("no signed-in employee or organization to join with")]
    NotAuthenticated,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}
