//! Error types shared by every adapter.

use thiserror::Error;

/// Main error type for adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Caller omitted a required argument or supplied an unsupported value.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Unknown tool name.
    #[error("Unknown tool: {0}")]
    MethodNotFound(String),

    /// Non-2xx response from the upstream API.
    #[error("API returned {status} {reason}: {message}", reason = status_reason(.status))]
    Upstream { status: u16, message: String },

    /// Token acquisition/refresh failed, or the adapter is not logged in.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network-level failure talking to the upstream (URL redacted).
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// SQL errors (PostgreSQL adapter).
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors (invalid URLs, conflicting flags).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else that went wrong while executing a handler.
    #[error("Internal error: {0}")]
    Internal(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    /// Upstream HTTP status, if this error came from a non-2xx response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn status_reason(status: &u16) -> &'static str {
    reqwest::StatusCode::from_u16(*status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Map an error message to a friendlier classification by the HTTP status it embeds.
///
/// `404` → not found, `403` → permission denied, `401` → authentication failed. Anything else is
/// returned unchanged.
#[must_use]
pub fn classify_status_message(message: &str) -> String {
    if message.contains("404") {
        format!("Resource not found: {message}")
    } else if message.contains("403") {
        format!("Permission denied: {message}")
    } else if message.contains("401") {
        format!("Authentication failed: {message}")
    } else {
        message.to_string()
    }
}
