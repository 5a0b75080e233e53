//! Error types for the bot client

use thiserror::Error;

/// Result type alias for bot client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the chat-bot
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The bot replied with a non-success status code
    #[error("bot replied with status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        message: String,
    },
}

impl ClientError {
    /// Create an error from a status code and response body
    pub fn unexpected_status(status: u16, message: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { status, .. } if *status >= 500)
    }
}
