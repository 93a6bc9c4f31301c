//! Mode-specific credential behaviour behind one interface.

use super::models::{AuthOutcome, AuthState, ProfileUpdate, RegisterRequest};
use crate::config::AuthMode;
use async_trait::async_trait;

/// Placeholder credential handed out in demo mode
pub const DEMO_ACCESS_TOKEN: &str = "demo-access-token";

/// One implementation per operating mode, chosen once at construction.
///
/// Implementations own an `Arc<AuthStore>` and express every outcome as a
/// state write or an [`AuthOutcome`]; none of these methods can fail.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn mode(&self) -> AuthMode;

    /// Settle the initial state. Called at most once per controller.
    async fn initialize(&self);

    async fn login(&self, email: &str, password: &str) -> AuthOutcome;

    async fn register(&self, request: RegisterRequest) -> AuthOutcome;

    async fn logout(&self);

    async fn update_profile(&self, update: ProfileUpdate) -> AuthOutcome;

    /// Credential to attach to outbound requests for the given snapshot
    fn access_token(&self, state: &AuthState) -> Option<String>;
}

/// Read-only credential accessor consumed by the HTTP and realtime clients
pub trait CredentialSource: Send + Sync {
    /// Token for the `Authorization: Bearer` header or the channel URL
    fn access_token(&self) -> Option<String>;

    /// Identifier of the signed-in user
    fn user_id(&self) -> Option<String>;
}

/// Fixed credentials, used by tests and service-to-service callers.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl CredentialSource for StaticCredentials {
    fn access_token(&self) -> Option<String> {
        self.access_token.clone()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
