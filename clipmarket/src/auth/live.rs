//! Live credential provider backed by a real identity provider and profile
//! store.

use super::{
    credentials::CredentialProvider,
    errors::{AuthError, AuthResult},
    models::{AuthOutcome, AuthState, AuthUser, ProfileUpdate, RegisterRequest, Session},
    provider::{IdentityProvider, ProfileStore, SessionEvent},
    store::AuthStore,
};
use crate::{config::AuthMode, observer::lock};
use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};

/// Live-mode implementation of [`CredentialProvider`]
pub struct LiveProvider {
    store: Arc<AuthStore>,
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    init_timeout: Duration,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveProvider {
    pub fn new(
        store: Arc<AuthStore>,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        init_timeout: Duration,
    ) -> Self {
        Self {
            store,
            identity,
            profiles,
            init_timeout,
            session_task: Mutex::new(None),
        }
    }

    /// Fetch the current session and populate the user from its profile.
    async fn bootstrap(&self) {
        match self.identity.get_session().await {
            Err(err) => {
                log::error!("Failed to fetch session during initialization: {}", err);
                let message = AuthError::from(err).client_message();
                self.store.update(|s| {
                    s.user = None;
                    s.session = None;
                    s.is_loading = false;
                    s.error = Some(message);
                    s.is_initialized = true;
                });
            }
            Ok(None) => {
                self.store.update(|s| {
                    s.user = None;
                    s.session = None;
                    s.is_loading = false;
                    s.error = None;
                    s.is_initialized = true;
                });
            }
            Ok(Some(session)) => {
                apply_session(&self.store, self.profiles.as_ref(), session).await;
                self.store.update(|s| s.is_initialized = true);
            }
        }
    }

    fn spawn_session_listener(&self, mut events: broadcast::Receiver<SessionEvent>) {
        let store = Arc::clone(&self.store);
        let profiles = Arc::clone(&self.profiles);

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::SignedIn(session)) | Ok(SessionEvent::TokenRefreshed(session)) => {
                        log::debug!("Session change for user {}", session.user.id);
                        apply_session(&store, profiles.as_ref(), session).await;
                    }
                    Ok(SessionEvent::SignedOut) => {
                        log::debug!("Session ended");
                        store.update(clear_identity);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Session listener lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = lock(&self.session_task).replace(handle) {
            previous.abort();
        }
    }

    fn fail(&self, err: AuthError) -> AuthOutcome {
        let message = err.client_message();
        self.store.update(|s| {
            s.is_loading = false;
            s.error = Some(message.clone());
        });
        AuthOutcome::failed(message)
    }
}

impl Drop for LiveProvider {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.session_task).take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl CredentialProvider for LiveProvider {
    fn mode(&self) -> AuthMode {
        AuthMode::Live
    }

    async fn initialize(&self) {
        // Subscribe before the first fetch so no change is missed.
        let events = self.identity.session_events();

        if tokio::time::timeout(self.init_timeout, self.bootstrap())
            .await
            .is_err()
        {
            log::warn!(
                "Identity provider did not answer within {:?}; continuing signed out",
                self.init_timeout
            );
            self.store.update(|s| {
                s.user = None;
                s.session = None;
                s.is_loading = false;
                s.error = None;
                s.is_initialized = true;
            });
        }

        self.spawn_session_listener(events);
    }

    async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        self.store.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        // The user is populated by the session listener once the provider
        // announces the sign-in.
        match self.identity.sign_in_with_password(email, password).await {
            Ok(_) => AuthOutcome::ok(),
            Err(err) => {
                log::warn!("Sign-in failed for {}: {}", email, err);
                self.fail(AuthError::from(err))
            }
        }
    }

    async fn register(&self, request: RegisterRequest) -> AuthOutcome {
        self.store.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        match self
            .identity
            .sign_up(&request.email, &request.password, request.metadata())
            .await
        {
            Ok(result) => {
                if result.session.is_none() {
                    // Confirmation pending: nothing will be announced.
                    log::info!("Account {} created, awaiting confirmation", result.user.id);
                    self.store.update(|s| s.is_loading = false);
                }
                AuthOutcome::ok()
            }
            Err(err) => {
                log::warn!("Sign-up failed for {}: {}", request.email, err);
                self.fail(AuthError::from(err))
            }
        }
    }

    async fn logout(&self) {
        if let Err(err) = self.identity.sign_out().await {
            log::warn!("Remote sign-out failed, clearing local session anyway: {}", err);
        }
        self.store.update(clear_identity);
    }

    async fn update_profile(&self, update: ProfileUpdate) -> AuthOutcome {
        let state = self.store.snapshot();
        let (Some(user), Some(session)) = (state.user, state.session) else {
            return AuthOutcome::from(AuthError::NotAuthenticated);
        };

        let result: AuthResult<AuthUser> = async {
            let record = self.profiles.update(&user.id, &update, &session).await?;
            AuthUser::try_from(record)
        }
        .await;

        match result {
            Ok(updated) => {
                self.store.update(|s| s.user = Some(updated));
                AuthOutcome::ok()
            }
            Err(err) => {
                log::warn!("Profile update failed for {}: {}", user.id, err);
                AuthOutcome::from(err)
            }
        }
    }

    fn access_token(&self, state: &AuthState) -> Option<String> {
        state
            .session
            .as_ref()
            .map(|session| session.access_token.clone())
    }
}

/// Load the profile for `session` and publish the resulting identity.
///
/// While the profile loads, the previous user/session stay visible with
/// `is_loading` set. A profile failure publishes the error with no user.
async fn apply_session(store: &AuthStore, profiles: &dyn ProfileStore, session: Session) {
    store.update(|s| s.is_loading = true);

    let loaded: AuthResult<AuthUser> = async {
        let record = profiles.load_or_create(&session.user, &session).await?;
        AuthUser::try_from(record)
    }
    .await;

    match loaded {
        Ok(user) => {
            store.update(|s| {
                s.user = Some(user);
                s.session = Some(session);
                s.is_loading = false;
                s.error = None;
                s.is_demo_mode = false;
            });
        }
        Err(err) => {
            log::error!("Failed to load profile for {}: {}", session.user.id, err);
            let message = err.client_message();
            store.update(|s| {
                s.user = None;
                s.session = None;
                s.is_loading = false;
                s.error = Some(message);
                s.is_demo_mode = false;
            });
        }
    }
}

/// Signed-out live state. Also ends an injected demo session.
fn clear_identity(state: &mut AuthState) {
    state.user = None;
    state.session = None;
    state.is_loading = false;
    state.error = None;
    state.is_demo_mode = false;
}
