//! HTTP client error types.

use thiserror::Error;

/// Errors raised while performing an HTTP call
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend could not be reached or the request timed out
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status
    #[error("Request failed ({status}): {message}")]
    Status {
        status: u16,
        message: String,
        errors: Option<Vec<String>>,
    },

    /// A 2xx body could not be decoded into the expected type
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// A failed envelope converted with `into_result`
    #[error("{0}")]
    Failed(String),
}

impl ApiError {
    /// Get a client-safe error message that doesn't leak transport details
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Transport(err) if err.is_timeout() => "Request timed out".to_string(),
            ApiError::Transport(_) => "Network error. Please check your connection.".to_string(),
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Decode(_) => "Unexpected response from server".to_string(),
            ApiError::Failed(message) => message.clone(),
        }
    }
}

/// Result type for HTTP client internals
pub type ApiResult<T> = Result<T, ApiError>;
