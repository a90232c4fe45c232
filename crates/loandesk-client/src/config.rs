//! Client configuration
//!
//! Loaded from TOML; every field has a default so partial files work.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a second trigger does while the same action is in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchMode {
    /// Ignore the new trigger
    #[default]
    DropIfBusy,
    /// Run it after the current one, in arrival order
    Queue,
}

/// Organization used when the active route has none
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrganizationFallback {
    /// Send an empty `organization` header
    #[default]
    EmptySentinel,
    /// Fail organization-scoped requests locally
    Reject,
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every REST path is appended to
    pub api_base_url: String,
    /// Duplex channel endpoint
    pub socket_url: String,
    /// Transport timeout
    pub request_timeout_secs: u64,
    /// Default behavior for repeated triggers
    pub dispatch_mode: DispatchMode,
    /// Length of approval challenges
    pub challenge_length: usize,
    pub organization_fallback: OrganizationFallback,
    /// Session file; in-memory storage when unset
    pub storage_path: Option<PathBuf>,
    /// Buffered progress events per subscriber
    pub progress_capacity: usize,
    /// Buffered hub events per subscriber and socket frames
    pub hub_capacity: usize,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML and validate
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` on out-of-range values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - any error from [`ClientConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if self.socket_url.trim().is_empty() {
            return Err(invalid("socket_url", "must not be empty"));
        }
        if self.challenge_length == 0 {
            return Err(invalid("challenge_length", "must be at least 1"));
        }
        if self.progress_capacity == 0 {
            return Err(invalid("progress_capacity", "must be at least 1"));
        }
        if self.hub_capacity == 0 {
            return Err(invalid("hub_capacity", "must be at least 1"));
        }
        Ok(())
    }

    /// Transport timeout as a duration
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    #[must_use]
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    #[must_use]
    pub fn with_challenge_length(mut self, length: usize) -> Self {
        self.challenge_length = length;
        self
    }

    #[must_use]
    pub fn with_organization_fallback(mut self, fallback: OrganizationFallback) -> Self {
        self.organization_fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            socket_url: "ws://localhost:8080/socket".to_string(),
            request_timeout_secs: 30,
            dispatch_mode: DispatchMode::DropIfBusy,
            challenge_length: 6,
            organization_fallback: OrganizationFallback::EmptySentinel,
            storage_path: None,
            progress_capacity: 64,
            hub_capacity: 64,
        }
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}
