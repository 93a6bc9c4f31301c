//! The authentication state controller.

use super::{
    credentials::{CredentialProvider, CredentialSource, DEMO_ACCESS_TOKEN},
    demo::DemoProvider,
    live::LiveProvider,
    models::{AuthOutcome, AuthState, AuthUser, ProfileUpdate, RegisterRequest, UserRole},
    provider::{IdentityProvider, ProfileStore},
    rest::{RestIdentityProvider, RestProfileStore},
    store::AuthStore,
};
use crate::{
    config::{AuthMode, AuthTimingConfig, RuntimeConfig},
    observer::Subscription,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::OnceCell;

/// Single source of truth for who is signed in.
///
/// One instance is constructed per running application and shared by
/// reference (usually behind an `Arc`). The operating mode is decided at
/// construction and never re-evaluated. No method returns an error: every
/// failure is reported through [`AuthOutcome`] or the published
/// [`AuthState`].
pub struct AuthController {
    mode: AuthMode,
    store: Arc<AuthStore>,
    provider: Box<dyn CredentialProvider>,
    demo_latency: Duration,
    initialized: OnceCell<()>,
}

impl AuthController {
    /// Build a controller from runtime configuration.
    ///
    /// Live mode is selected only when both the provider URL and key are
    /// usable; anything else falls back to demo mode silently.
    pub fn new(config: &RuntimeConfig) -> Self {
        match config.provider.detect_mode() {
            AuthMode::Live => {
                let url = config.provider.url.clone().unwrap_or_default();
                let key = config.provider.api_key.clone().unwrap_or_default();
                log::info!("Authentication running against identity provider at {}", url);
                Self::live(
                    &config.auth,
                    Arc::new(RestIdentityProvider::new(url.clone(), key.clone())),
                    Arc::new(RestProfileStore::new(url, key)),
                )
            }
            AuthMode::Demo => Self::demo(&config.auth),
        }
    }

    /// Build a demo-mode controller
    pub fn demo(timing: &AuthTimingConfig) -> Self {
        let store = Arc::new(AuthStore::new(AuthState::initial(true)));
        let provider = DemoProvider::new(Arc::clone(&store), timing.demo_latency);
        Self::assemble(AuthMode::Demo, store, Box::new(provider), timing)
    }

    /// Build a live-mode controller over the given collaborators
    pub fn live(
        timing: &AuthTimingConfig,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let store = Arc::new(AuthStore::new(AuthState::initial(false)));
        let provider = LiveProvider::new(Arc::clone(&store), identity, profiles, timing.init_timeout);
        Self::assemble(AuthMode::Live, store, Box::new(provider), timing)
    }

    fn assemble(
        mode: AuthMode,
        store: Arc<AuthStore>,
        provider: Box<dyn CredentialProvider>,
        timing: &AuthTimingConfig,
    ) -> Self {
        Self {
            mode,
            store,
            provider,
            demo_latency: timing.demo_latency,
            initialized: OnceCell::new(),
        }
    }

    /// Settle the initial state.
    ///
    /// Only the first call does any work; concurrent callers wait for that
    /// call to finish. In live mode this completes within the configured
    /// init timeout even when the provider never answers. Every operation
    /// that changes the state calls this first, so explicit initialization
    /// is optional.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                log::debug!("Initializing authentication ({:?} mode)", self.mode);
                self.provider.initialize().await;
            })
            .await;
    }

    /// Sign in with email and password.
    ///
    /// In live mode a successful result means the provider accepted the
    /// credentials; the user appears in the state once the profile loads.
    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        self.initialize().await;
        self.provider.login(email, password).await
    }

    /// Create an account and sign in; same completion rules as [`AuthController::login`]
    pub async fn register(&self, request: RegisterRequest) -> AuthOutcome {
        self.initialize().await;
        self.provider.register(request).await
    }

    /// Inject `user` directly, bypassing the account directory.
    ///
    /// Always uses demo semantics: no session is held and the snapshot is
    /// flagged as demo, whatever mode the controller runs in. In live mode
    /// the flag lasts until the next sign-out or real sign-in.
    pub async fn demo_login(&self, user: AuthUser) -> AuthOutcome {
        self.initialize().await;
        self.store.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
        tokio::time::sleep(self.demo_latency).await;

        log::info!("Demo session injected for {} ({})", user.username, user.role);
        self.store.update(|s| {
            s.user = Some(user);
            s.session = None;
            s.is_loading = false;
            s.error = None;
            s.is_demo_mode = true;
        });
        AuthOutcome::ok()
    }

    /// Sign out. Local state is cleared even if the remote call fails.
    pub async fn logout(&self) {
        self.initialize().await;
        self.provider.logout().await;
    }

    /// Change fields of the signed-in user's profile
    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthOutcome {
        self.initialize().await;
        if update.is_empty() {
            return AuthOutcome::ok();
        }
        self.provider.update_profile(update).await
    }

    /// Register an observer; see [`AuthStore::subscribe`].
    pub fn subscribe(&self, listener: impl Fn(&AuthState) + Send + Sync + 'static) -> Subscription {
        self.store.subscribe(listener)
    }

    /// Current snapshot
    pub fn state(&self) -> AuthState {
        self.store.snapshot()
    }

    /// Signed-in user, if any
    pub fn user(&self) -> Option<AuthUser> {
        self.store.snapshot().user
    }

    /// Mode chosen at construction; constant for the controller's lifetime
    pub fn is_demo_mode(&self) -> bool {
        self.mode == AuthMode::Demo
    }

    /// Operating mode
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Credential for outbound requests.
    ///
    /// Demo mode, and injected demo sessions, yield the fixed placeholder
    /// token; live mode yields the session's access token, if any.
    pub fn access_token(&self) -> Option<String> {
        let state = self.store.snapshot();
        if state.is_demo_mode && state.session.is_none() {
            return Some(DEMO_ACCESS_TOKEN.to_string());
        }
        self.provider.access_token(&state)
    }

    /// Value for the `Authorization` header
    pub fn auth_header(&self) -> Option<String> {
        self.access_token().map(|token| format!("Bearer {}", token))
    }

    /// Whether the signed-in user has `role`
    pub fn has_role(&self, role: UserRole) -> bool {
        self.store
            .snapshot()
            .user
            .is_some_and(|user| user.role == role)
    }
}

impl CredentialSource for AuthController {
    fn access_token(&self) -> Option<String> {
        AuthController::access_token(self)
    }

    fn user_id(&self) -> Option<String> {
        self.user().map(|user| user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::demo::DEMO_PASSWORD;
    use chrono::Utc;
    use std::sync::Mutex;

    fn controller() -> AuthController {
        AuthController::new(&RuntimeConfig::demo())
    }

    fn preview_user() -> AuthUser {
        AuthUser {
            id: "preview-1".to_string(),
            email: "preview@clipmarket.dev".to_string(),
            username: "preview".to_string(),
            role: UserRole::Clipper,
            channel_link: None,
            avatar: None,
            is_verified: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_provider_selects_demo_mode() {
        let auth = controller();
        assert!(auth.is_demo_mode());

        auth.initialize().await;
        let state = auth.state();
        assert!(state.is_initialized);
        assert!(state.is_demo_mode);
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_runs_once() {
        let auth = controller();
        auth.initialize().await;
        auth.login("creator@demo.com", DEMO_PASSWORD).await;

        // A second initialize must not reset the signed-in user.
        auth.initialize().await;
        assert!(auth.state().user.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_initializes_on_first_use() {
        let auth = controller();
        assert!(!auth.state().is_initialized);

        assert!(auth.login("clipper@demo.com", DEMO_PASSWORD).await.success);
        let state = auth.state();
        assert!(state.is_initialized);
        assert!(!state.is_loading);
        assert_eq!(state.user.unwrap().email, "clipper@demo.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_token_and_header() {
        let auth = controller();
        assert_eq!(auth.access_token().as_deref(), Some(DEMO_ACCESS_TOKEN));
        assert_eq!(
            auth.auth_header(),
            Some(format!("Bearer {}", DEMO_ACCESS_TOKEN))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_has_role_follows_user() {
        let auth = controller();
        auth.initialize().await;
        assert!(!auth.has_role(UserRole::Admin));

        auth.login("admin@demo.com", DEMO_PASSWORD).await;
        assert!(auth.has_role(UserRole::Admin));
        assert!(!auth.has_role(UserRole::Creator));

        auth.logout().await;
        assert!(!auth.has_role(UserRole::Admin));
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_login_injects_user_after_latency() {
        let auth = controller();
        auth.initialize().await;

        let started = tokio::time::Instant::now();
        let outcome = auth.demo_login(preview_user()).await;
        assert!(outcome.success);
        assert!(started.elapsed() >= Duration::from_millis(800));

        let state = auth.state();
        assert_eq!(state.user.unwrap().id, "preview-1");
        assert!(state.session.is_none());
        assert!(state.is_demo_mode);
        assert_eq!(CredentialSource::user_id(&auth).as_deref(), Some("preview-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_sees_loading_then_user() {
        let auth = controller();
        auth.initialize().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let sub = auth.subscribe(move |state| {
            seen_in
                .lock()
                .unwrap()
                .push((state.is_loading, state.user.is_some()));
        });

        auth.login("clipper@demo.com", DEMO_PASSWORD).await;
        sub.unsubscribe();
        auth.logout().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(false, false), (true, false), (false, true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_profile_replaces_user() {
        let auth = controller();
        auth.initialize().await;
        auth.login("creator@demo.com", DEMO_PASSWORD).await;
        let before = auth.user().unwrap();

        let outcome = auth
            .update_profile(ProfileUpdate {
                username: Some("renamed".to_string()),
                ..Default::default()
            })
            .await;
        assert!(outcome.success);

        let after = auth.user().unwrap();
        assert_eq!(after.username, "renamed");
        assert_eq!(after.id, before.id);
    }
}
