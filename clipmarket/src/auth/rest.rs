//! REST implementations of the identity provider and profile store.
//!
//! The identity side speaks the GoTrue-style `/auth/v1` API (password and
//! refresh-token grants, sign-up, logout). The profile side speaks a
//! PostgREST-style `/rest/v1/profiles` table API. Both authenticate with the
//! project's public key in the `apikey` header.

use super::{
    errors::ProviderError,
    models::{ProfileRecord, ProfileUpdate, ProviderUser, Session},
    provider::{IdentityProvider, ProfileStore, SessionEvent, SignUpResult},
};
use crate::observer::lock;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Response, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Capacity of the session-change broadcast
const SESSION_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + ChronoDuration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Map a non-2xx response to [`ProviderError::Rejected`].
async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                format!("Request failed with status {}", status.as_u16())
            } else {
                text
            }
        });

    Err(ProviderError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// GoTrue-compatible identity provider holding the current session in memory
pub struct RestIdentityProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl RestIdentityProvider {
    /// Create a provider for `base_url` using the public `api_key`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            session: Mutex::new(None),
            events,
        }
    }

    /// Resume a session obtained earlier (e.g. restored by the caller)
    pub fn with_session(self, session: Session) -> Self {
        *lock(&self.session) = Some(session);
        self
    }

    /// Copy of the held session, for callers that persist tokens
    pub fn current_session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn announce(&self, event: SessionEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    async fn token_grant<B: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<Session, ProviderError> {
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let token: TokenResponse = decode(check(response).await?).await?;
        Ok(token.into_session())
    }

    /// Exchange the held refresh token for a new session.
    ///
    /// Announces `TokenRefreshed` on success. A rejected refresh token drops
    /// the session and announces `SignedOut`.
    pub async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(refresh_token) = self
            .current_session()
            .and_then(|session| session.refresh_token)
        else {
            return Ok(None);
        };

        match self
            .token_grant(
                "refresh_token",
                &RefreshGrant {
                    refresh_token: &refresh_token,
                },
            )
            .await
        {
            Ok(session) => {
                *lock(&self.session) = Some(session.clone());
                self.announce(SessionEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            Err(ProviderError::Rejected { status, message }) => {
                log::warn!("Refresh token rejected ({}): {}", status, message);
                *lock(&self.session) = None;
                self.announce(SessionEvent::SignedOut);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        match self.current_session() {
            Some(session) if session.is_expired() => self.refresh_session().await,
            other => Ok(other),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password })
            .await?;

        *lock(&self.session) = Some(session.clone());
        self.announce(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpResult, ProviderError> {
        let response = self
            .client
            .post(self.url("signup"))
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&SignUpBody {
                email,
                password,
                data: metadata,
            })
            .send()
            .await?;

        let body: serde_json::Value = decode(check(response).await?).await?;

        // Auto-confirmed projects answer with a token; others with the user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ProviderError::Malformed(e.to_string()))?;
            let session = token.into_session();
            *lock(&self.session) = Some(session.clone());
            self.announce(SessionEvent::SignedIn(session.clone()));
            return Ok(SignUpResult {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: ProviderUser = serde_json::from_value(user_value)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(SignUpResult {
            user,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let session = lock(&self.session).take();

        let result = match session {
            Some(session) => {
                let response = self
                    .client
                    .post(self.url("logout"))
                    .header("apikey", &self.api_key)
                    .header(AUTHORIZATION, format!("Bearer {}", session.access_token))
                    .send()
                    .await;
                match response {
                    Ok(response) => check(response).await.map(|_| ()),
                    Err(err) => Err(ProviderError::from(err)),
                }
            }
            None => Ok(()),
        };

        self.announce(SessionEvent::SignedOut);
        result
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, Serialize)]
struct NewProfile<'a> {
    id: &'a str,
    email: &'a str,
    username: String,
    role: String,
    channel_link: Option<String>,
}

/// PostgREST-style profile table client
pub struct RestProfileStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestProfileStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/profiles", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder, session: &Session) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", session.access_token))
    }

    async fn first_row(response: Response) -> Result<Option<ProfileRecord>, ProviderError> {
        let rows: Vec<ProfileRecord> = decode(check(response).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch(&self, user_id: &str, session: &Session) -> Result<Option<ProfileRecord>, ProviderError> {
        let response = self
            .authorized(self.client.get(self.table_url()), session)
            .query(&[("id", format!("eq.{user_id}")), ("select", "*".to_string())])
            .send()
            .await?;
        Self::first_row(response).await
    }

    async fn create(&self, user: &ProviderUser, session: &Session) -> Result<ProfileRecord, ProviderError> {
        let email = user.email.clone().unwrap_or_default();
        let metadata = |key: &str| {
            user.user_metadata
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };

        let profile = NewProfile {
            id: &user.id,
            email: &email,
            username: metadata("username").unwrap_or_else(|| default_username(&email)),
            role: metadata("role").unwrap_or_else(|| "creator".to_string()),
            channel_link: metadata("channel_link"),
        };

        log::info!("Creating profile for user {}", user.id);
        let response = self
            .authorized(self.client.post(self.table_url()), session)
            .header("Prefer", "return=representation")
            .json(&profile)
            .send()
            .await?;

        Self::first_row(response)
            .await?
            .ok_or_else(|| ProviderError::Malformed("profile insert returned no rows".to_string()))
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn load_or_create(
        &self,
        user: &ProviderUser,
        session: &Session,
    ) -> Result<ProfileRecord, ProviderError> {
        match self.fetch(&user.id, session).await? {
            Some(profile) => Ok(profile),
            None => self.create(user, session).await,
        }
    }

    async fn update(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        session: &Session,
    ) -> Result<ProfileRecord, ProviderError> {
        let response = self
            .authorized(self.client.patch(self.table_url()), session)
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await?;

        Self::first_row(response)
            .await?
            .ok_or_else(|| ProviderError::Malformed(format!("no profile row for {user_id}")))
    }
}

fn default_username(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("user")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_expiry_from_expires_in() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": { "id": "u-1", "email": "a@b.c" }
        }))
        .unwrap();

        let session = token.into_session();
        let expires_at = session.expires_at.unwrap();
        assert!(expires_at > Utc::now() + ChronoDuration::seconds(3500));
        assert_eq!(session.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "user": { "id": "u-1" }
        }))
        .unwrap();

        let session = token.into_session();
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert!(session.is_expired());
    }

    #[test]
    fn test_error_body_message_precedence() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid login credentials"));

        let body: ErrorBody = serde_json::from_str(r#"{"msg":"User already registered"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("User already registered"));
    }

    #[test]
    fn test_default_username() {
        assert_eq!(default_username("nia@clipmarket.dev"), "nia");
        assert_eq!(default_username("@nowhere"), "user");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = RestIdentityProvider::new("https://id.clipmarket.dev/", "key");
        assert_eq!(provider.url("token"), "https://id.clipmarket.dev/auth/v1/token");
    }
}
