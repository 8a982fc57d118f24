//! Connection settings for cytube-client

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default wait for a bounded accessor, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Directory service queried for socket server locations
pub const DEFAULT_CONFIG_BASE_URL: &str = "https://cytu.be";

/// Password submissions tolerated before a repeated prompt counts as a rejection.
///
/// The server can prompt twice before it has seen our first answer, so a single
/// repeat is not proof of a wrong password.
pub const DEFAULT_MAX_PASSWORD_ATTEMPTS: u32 = 2;

/// Settings for one connection attempt.
///
/// Consumed by [`crate::connect`]; a connection never observes later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Channel to join
    pub channel: String,

    /// Socket server URL. Skips the config lookup when set.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Channel password, if the channel requires one
    #[serde(default)]
    pub password: Option<String>,

    /// Prefer TLS socket servers during lookup
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Reconnect automatically when the socket drops
    #[serde(default = "default_true")]
    pub reconnection: bool,

    /// Accessor timeout in milliseconds (0 = wait forever)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Password submissions allowed before giving up
    #[serde(default = "default_max_password_attempts")]
    pub max_password_attempts: u32,

    /// Base URL of the socket config directory
    #[serde(default = "default_config_base_url")]
    pub config_base_url: String,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_password_attempts() -> u32 {
    DEFAULT_MAX_PASSWORD_ATTEMPTS
}

fn default_config_base_url() -> String {
    DEFAULT_CONFIG_BASE_URL.to_string()
}

impl ConnectionSettings {
    /// Settings for `channel` with every default applied.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            endpoint: None,
            password: None,
            secure: true,
            reconnection: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_password_attempts: DEFAULT_MAX_PASSWORD_ATTEMPTS,
            config_base_url: default_config_base_url(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_reconnection(mut self, reconnection: bool) -> Self {
        self.reconnection = reconnection;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_password_attempts(mut self, attempts: u32) -> Self {
        self.max_password_attempts = attempts;
        self
    }

    pub fn with_config_base_url(mut self, url: impl Into<String>) -> Self {
        self.config_base_url = url.into();
        self
    }

    /// Accessor timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.timeout_ms)
    }

    /// Check the settings before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(ClientError::Validation(
                "a channel name is required".to_string(),
            ));
        }
        if self.max_password_attempts == 0 {
            return Err(ClientError::Validation(
                "max_password_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(endpoint) = &self.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ClientError::Validation(
                    "endpoint must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl From<&str> for ConnectionSettings {
    fn from(channel: &str) -> Self {
        Self::new(channel)
    }
}

impl From<String> for ConnectionSettings {
    fn from(channel: String) -> Self {
        Self::new(channel)
    }
}

pub(crate) fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
