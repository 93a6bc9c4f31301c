//! Interfaces of the external identity provider and profile store.

use super::{
    errors::ProviderError,
    models::{ProfileRecord, ProfileUpdate, ProviderUser, Session},
};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Session change announced by the identity provider
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

/// Result of a sign-up call.
///
/// Providers that require email confirmation return no session.
#[derive(Debug, Clone)]
pub struct SignUpResult {
    pub user: ProviderUser,
    pub session: Option<Session>,
}

/// Identity/session provider consumed by live mode
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if any
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Password sign-in; announces `SignedIn` on success
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    /// Account creation with sign-up metadata
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpResult, ProviderError>;

    /// Sign-out; announces `SignedOut` even when the remote call fails
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Stream of session changes for the remainder of the provider's lifetime
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Profile store consumed by live mode
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load the profile row for `user`, creating it from sign-up metadata if absent
    async fn load_or_create(
        &self,
        user: &ProviderUser,
        session: &Session,
    ) -> Result<ProfileRecord, ProviderError>;

    /// Update profile fields and return the stored row
    async fn update(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        session: &Session,
    ) -> Result<ProfileRecord, ProviderError>;
}
