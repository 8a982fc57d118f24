//! Error types for cytube-client

use thiserror::Error;

/// Client error
#[derive(Debug, Error)]
pub enum ClientError {
    /// Settings were rejected before any network activity
    #[error("Invalid settings: {0}")]
    Validation(String),

    /// Socket config lookup failed or offered no usable server
    #[error("Could not resolve socket server: {0}")]
    Resolution(String),

    /// Channel password missing or rejected. The session has been closed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The expected broadcast did not arrive in time. The session stays open.
    #[error("Request timed out after {timeout_ms}ms waiting for '{event}'")]
    Timeout { event: String, timeout_ms: u64 },

    /// WebSocket or URL failure while opening or writing to the session
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session was closed
    #[error("Connection closed")]
    Closed,

    /// Malformed wire packet
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Resolution(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
