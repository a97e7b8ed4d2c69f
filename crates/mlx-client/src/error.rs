//! Client errors.

use thiserror::Error;

/// Errors produced while configuring or talking to a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Connection parameters cannot be turned into a usable client
    /// (unreadable CA file, malformed certificate, invalid TLS setup).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network-level failure before a response was received.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The server answered but the body could not be decoded.
    #[error("malformed response: {0}")]
    Response(String),

    /// The blocking request task was cancelled or panicked.
    #[error("request task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// HTTP status code, when the failure came from a server response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
