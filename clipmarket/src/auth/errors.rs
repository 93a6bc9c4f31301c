//! Authentication error types.

use thiserror::Error;

/// Errors raised by the identity provider or the profile store.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status
    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider answered with a body we could not interpret
    #[error("Malformed provider response: {0}")]
    Malformed(String),

    /// No session is held for an operation that needs one
    #[error("No active session")]
    NoSession,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Identity provider or profile store failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Email and password did not match any account
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Registration collided with an existing account
    #[error("An account with this email already exists")]
    EmailTaken,

    /// A profile record could not be turned into a user
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// Operation requires a signed-in user
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak transport details
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Provider(ProviderError::Transport(_)) => {
                "Unable to reach the authentication service".to_string()
            }
            AuthError::Provider(ProviderError::Malformed(_)) => {
                "Authentication service returned an unexpected response".to_string()
            }
            AuthError::Provider(ProviderError::Rejected { message, .. }) => message.clone(),
            AuthError::Provider(ProviderError::NoSession) => "Not authenticated".to_string(),
            AuthError::InvalidProfile(_) => "Failed to load user profile".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
