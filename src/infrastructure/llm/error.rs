//! Error types for LLM API client operations.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when interacting with the LLM API.
#[derive(Error, Debug, Clone)]
pub enum LlmApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unknown error ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl LlmApiError {
    /// Map an HTTP status and body to an error.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest(body),
            401 | 403 => Self::InvalidApiKey,
            429 => Self::RateLimitExceeded,
            500 | 502 | 503 | 504 | 529 => Self::ServerError(status, body),
            _ => Self::UnknownError(status, body),
        }
    }

    /// Transient errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError(_, _) | Self::NetworkError(_)
        )
    }
}
