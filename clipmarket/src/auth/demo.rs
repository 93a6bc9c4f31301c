//! Offline credential provider backed by a fixed directory of mock accounts.

use super::{
    credentials::{CredentialProvider, DEMO_ACCESS_TOKEN},
    errors::AuthError,
    models::{AuthOutcome, AuthState, AuthUser, ProfileUpdate, RegisterRequest, UserRole},
    store::AuthStore,
};
use crate::{config::AuthMode, observer::lock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

/// Password shared by the built-in demo accounts
pub const DEMO_PASSWORD: &str = "demo123";

#[derive(Debug, Clone)]
struct DemoAccount {
    password: String,
    user: AuthUser,
}

/// Demo-mode implementation of [`CredentialProvider`]
pub struct DemoProvider {
    store: Arc<AuthStore>,
    latency: Duration,
    directory: Mutex<Vec<DemoAccount>>,
}

impl DemoProvider {
    pub fn new(store: Arc<AuthStore>, latency: Duration) -> Self {
        Self {
            store,
            latency,
            directory: Mutex::new(default_directory()),
        }
    }

    /// Emails of every account currently known to the directory
    pub fn account_emails(&self) -> Vec<String> {
        lock(&self.directory)
            .iter()
            .map(|account| account.user.email.clone())
            .collect()
    }

    fn find(&self, email: &str, password: &str) -> Option<AuthUser> {
        lock(&self.directory)
            .iter()
            .find(|account| {
                account.user.email.eq_ignore_ascii_case(email.trim()) && account.password == password
            })
            .map(|account| account.user.clone())
    }

    fn fail(&self, err: AuthError) -> AuthOutcome {
        let message = err.client_message();
        self.store.update(|s| {
            s.is_loading = false;
            s.error = Some(message.clone());
        });
        AuthOutcome::failed(message)
    }

    fn sign_in(&self, user: AuthUser) {
        self.store.update(|s| {
            s.user = Some(user);
            s.session = None;
            s.is_loading = false;
            s.error = None;
        });
    }
}

#[async_trait]
impl CredentialProvider for DemoProvider {
    fn mode(&self) -> AuthMode {
        AuthMode::Demo
    }

    async fn initialize(&self) {
        self.store.update(|s| {
            s.user = None;
            s.session = None;
            s.is_loading = false;
            s.error = None;
            s.is_initialized = true;
            s.is_demo_mode = true;
        });
        log::info!("Authentication running in demo mode");
    }

    async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        self.store.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
        tokio::time::sleep(self.latency).await;

        match self.find(email, password) {
            Some(user) => {
                log::info!("Demo login for {} ({})", user.username, user.role);
                self.sign_in(user);
                AuthOutcome::ok()
            }
            None => self.fail(AuthError::InvalidCredentials),
        }
    }

    async fn register(&self, request: RegisterRequest) -> AuthOutcome {
        self.store.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
        tokio::time::sleep(self.latency).await;

        let user = {
            let mut directory = lock(&self.directory);
            if directory
                .iter()
                .any(|account| account.user.email.eq_ignore_ascii_case(request.email.trim()))
            {
                drop(directory);
                return self.fail(AuthError::EmailTaken);
            }

            let user = AuthUser {
                id: format!("demo-{}", Uuid::new_v4()),
                email: request.email.trim().to_string(),
                username: request.username,
                role: request.role,
                channel_link: request.channel_link,
                avatar: None,
                is_verified: false,
                created_at: Utc::now(),
            };
            directory.push(DemoAccount {
                password: request.password,
                user: user.clone(),
            });
            user
        };

        log::info!("Demo account registered: {}", user.email);
        self.sign_in(user);
        AuthOutcome::ok()
    }

    async fn logout(&self) {
        self.store.update(|s| {
            s.user = None;
            s.session = None;
            s.is_loading = false;
            s.error = None;
        });
    }

    async fn update_profile(&self, update: ProfileUpdate) -> AuthOutcome {
        let Some(current) = self.store.snapshot().user else {
            return AuthOutcome::from(AuthError::NotAuthenticated);
        };
        tokio::time::sleep(self.latency).await;

        let updated = update.apply_to(&current);
        if let Some(account) = lock(&self.directory)
            .iter_mut()
            .find(|account| account.user.id == updated.id)
        {
            account.user = updated.clone();
        }
        self.store.update(|s| s.user = Some(updated));
        AuthOutcome::ok()
    }

    fn access_token(&self, _state: &AuthState) -> Option<String> {
        Some(DEMO_ACCESS_TOKEN.to_string())
    }
}

fn default_directory() -> Vec<DemoAccount> {
    let created_at = DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default();
    let account = |id: &str, email: &str, username: &str, role, channel_link: Option<&str>| {
        DemoAccount {
            password: DEMO_PASSWORD.to_string(),
            user: AuthUser {
                id: id.to_string(),
                email: email.to_string(),
                username: username.to_string(),
                role,
                channel_link: channel_link.map(str::to_string),
                avatar: None,
                is_verified: true,
                created_at,
            },
        }
    };

    vec![
        account(
            "demo-creator-001",
            "creator@demo.com",
            "demo_creator",
            UserRole::Creator,
            Some("https://youtube.com/@democreator"),
        ),
        account(
            "demo-clipper-001",
            "clipper@demo.com",
            "demo_clipper",
            UserRole::Clipper,
            Some("https://tiktok.com/@democlipper"),
        ),
        account("demo-admin-001", "admin@demo.com", "demo_admin", UserRole::Admin, None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DemoProvider {
        let store = Arc::new(AuthStore::new(AuthState::initial(true)));
        DemoProvider::new(store, Duration::from_millis(800))
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "Secret123".to_string(),
            username: "fresh".to_string(),
            role: UserRole::Clipper,
            channel_link: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_settles_without_network() {
        let demo = provider();
        demo.initialize().await;

        let state = demo.store.snapshot();
        assert!(state.is_initialized);
        assert!(!state.is_loading);
        assert!(state.is_demo_mode);
        assert!(state.user.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_matches_directory_case_insensitively() {
        let demo = provider();
        demo.initialize().await;

        let outcome = demo.login("Creator@Demo.com", DEMO_PASSWORD).await;
        assert!(outcome.success);
        let user = demo.store.snapshot().user.unwrap();
        assert_eq!(user.role, UserRole::Creator);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_simulates_latency() {
        let demo = provider();
        let started = tokio::time::Instant::now();
        demo.login("admin@demo.com", DEMO_PASSWORD).await;
        assert!(started.elapsed() >= Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_password_keeps_previous_user() {
        let demo = provider();
        demo.initialize().await;
        demo.login("clipper@demo.com", DEMO_PASSWORD).await;

        let outcome = demo.login("admin@demo.com", "nope").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Invalid email or password"));

        let state = demo.store.snapshot();
        assert_eq!(state.user.unwrap().role, UserRole::Clipper);
        assert!(state.error.is_none());
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_without_user_sets_error() {
        let demo = provider();
        demo.initialize().await;
        demo.login("ghost@demo.com", DEMO_PASSWORD).await;

        let state = demo.store.snapshot();
        assert!(state.user.is_none());
        assert_eq!(state.error.as_deref(), Some("Invalid email or password"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_generates_id_and_joins_directory() {
        let demo = provider();
        demo.initialize().await;

        assert!(demo.register(request("new@clipmarket.dev")).await.success);
        let user = demo.store.snapshot().user.unwrap();
        assert!(user.id.starts_with("demo-"));
        assert!(demo.account_emails().contains(&"new@clipmarket.dev".to_string()));

        demo.logout().await;
        assert!(demo.login("new@clipmarket.dev", "Secret123").await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_duplicate_email() {
        let demo = provider();
        let outcome = demo.register(request("creator@demo.com")).await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("An account with this email already exists")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_profile_requires_user() {
        let demo = provider();
        demo.initialize().await;
        let outcome = demo.update_profile(ProfileUpdate::default()).await;
        assert!(!outcome.success);
    }

    #[test]
    fn test_access_token_is_sentinel() {
        let demo = provider();
        assert_eq!(
            demo.access_token(&AuthState::initial(true)).as_deref(),
            Some(DEMO_ACCESS_TOKEN)
        );
    }
}
