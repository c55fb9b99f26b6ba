//! Error types for Scrapinghub client operations

use thiserror::Error;

use crate::streaming::StreamError;

/// Result type alias for Scrapinghub client operations
pub type Result<T> = std::result::Result<T, ShubClientError>;

/// Errors that can occur during Scrapinghub client operations
#[derive(Error, Debug)]
pub enum ShubClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Server returned an error response
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// The API answered with a non-`ok` status document
    #[error("API error: {0}")]
    ApiError(String),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Project or job identifier rejected before any request was made
    #[error("Invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    /// Job does not exist
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Line stream ended in a terminal failure
    #[error(transparent)]
    StreamError(#[from] StreamError),
}

impl ShubClientError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_identifier(value: &str, reason: &'static str) -> Self {
        Self::InvalidIdentifier {
            value: value.to_string(),
            reason,
        }
    }
}
