//! Authentication data models.

use super::errors::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Stable opaque user identifier
pub type UserId = String;

/// Marketplace role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Creator,
    Clipper,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Creator => "creator",
            UserRole::Clipper => "clipper",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creator" => Ok(UserRole::Creator),
            "clipper" => Ok(UserRole::Clipper),
            "admin" => Ok(UserRole::Admin),
            other => Err(AuthError::InvalidProfile(format!("unknown role '{other}'"))),
        }
    }
}

/// Signed-in identity as presented to the rest of the application.
///
/// Replaced wholesale on every update, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub channel_link: Option<String>,
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// User record embedded in a provider session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata captured at sign-up (username, role, channel link)
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Opaque credential handle issued by the identity provider
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: ProviderUser,
}

impl Session {
    /// Whether the access token has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.id)
            .finish()
    }
}

/// Row of the profile store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub channel_link: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRecord> for AuthUser {
    type Error = AuthError;

    fn try_from(record: ProfileRecord) -> AuthResult<Self> {
        let role = record.role.parse()?;
        Ok(AuthUser {
            id: record.id,
            email: record.email,
            username: record.username,
            role,
            channel_link: record.channel_link,
            avatar: record.avatar_url,
            is_verified: record.is_verified,
            created_at: record.created_at,
        })
    }
}

/// Fields a user may change on their own profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_link: Option<String>,
    #[serde(rename = "avatar_url", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.channel_link.is_none() && self.avatar.is_none()
    }

    /// Produce a new user with these fields applied
    pub fn apply_to(&self, user: &AuthUser) -> AuthUser {
        AuthUser {
            username: self.username.clone().unwrap_or_else(|| user.username.clone()),
            channel_link: self.channel_link.clone().or_else(|| user.channel_link.clone()),
            avatar: self.avatar.clone().or_else(|| user.avatar.clone()),
            ..user.clone()
        }
    }
}

/// User registration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub role: UserRole,
    pub channel_link: Option<String>,
}

impl RegisterRequest {
    /// Metadata attached to the provider account so the profile can be
    /// created lazily on first sign-in
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "username": self.username,
            "role": self.role.as_str(),
            "channel_link": self.channel_link,
        })
    }
}

/// Full externally observable authentication snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_initialized: bool,
    pub is_demo_mode: bool,
}

impl AuthState {
    /// State before initialization has settled
    pub fn initial(is_demo_mode: bool) -> Self {
        Self {
            user: None,
            session: None,
            is_loading: true,
            error: None,
            is_initialized: false,
            is_demo_mode,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Result of an authentication operation; operations never return `Err`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AuthOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

impl From<AuthError> for AuthOutcome {
    fn from(err: AuthError) -> Self {
        AuthOutcome::failed(err.client_message())
    }
}
