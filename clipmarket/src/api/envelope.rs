//! Uniform response envelope returned by every HTTP call.

use super::errors::ApiError;
use serde::{Deserialize, Serialize};

/// `{data, success, message?, errors?}`
///
/// Failures are values of this type, never `Err`s: transport errors and
/// non-2xx responses arrive as `success: false` with a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            success: true,
            message: None,
            errors: None,
        }
    }

    /// Successful response without a body (e.g. `204 No Content`)
    pub fn empty() -> Self {
        Self {
            data: None,
            success: true,
            message: None,
            errors: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            success: false,
            message: Some(message.into()),
            errors: None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: self.data.map(f),
            success: self.success,
            message: self.message,
            errors: self.errors,
        }
    }

    /// Convert into a `Result`, for callers that prefer `?`
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Failed(
                self.message
                    .unwrap_or_else(|| "Request failed".to_string()),
            ))
        }
    }
}

impl<T> From<ApiError> for ApiResponse<T> {
    fn from(err: ApiError) -> Self {
        let message = err.client_message();
        match err {
            ApiError::Status { errors, .. } => ApiResponse {
                errors,
                ..ApiResponse::failure(message)
            },
            _ => ApiResponse::failure(message),
        }
    }
}
