//! # Clipmarket
//!
//! Client runtime services for the clip marketplace: the pieces of the front
//! end that deal with time, failure and shared state rather than
//! presentation.
//!
//! ## Architecture
//!
//! Three services, built bottom-up:
//!
//! - **HTTP client** ([`api`]): authenticated requests that always resolve
//!   to an [`api::ApiResponse`] envelope, plus generic retry and
//!   time-to-live cache combinators.
//! - **Realtime channel** ([`realtime`]): one persistent connection per
//!   signed-in user with exponential-backoff reconnect, heartbeats and
//!   typed publish/subscribe.
//! - **Authentication controller** ([`auth`]): the single source of truth
//!   for who is signed in, running either against a real identity provider
//!   (live mode) or an offline account directory (demo mode).
//!
//! The controller initializes first and publishes [`auth::AuthState`]
//! snapshots. The channel and the HTTP client read credentials from it
//! through [`auth::CredentialSource`] at the moment they need them.
//!
//! ## Example
//!
//! ```
//! use clipmarket::{auth::AuthController, config::RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let auth = AuthController::new(&RuntimeConfig::demo());
//! auth.initialize().await;
//!
//! let state = auth.state();
//! assert!(auth.is_demo_mode());
//! assert!(state.is_initialized);
//! assert!(state.user.is_none());
//! # }
//! ```

/// HTTP client, response envelope, retry and cache.
pub mod api;

/// Authentication state controller and its identity backends.
pub mod auth;

/// Exponential backoff arithmetic.
pub mod backoff;

/// Environment-driven runtime configuration.
pub mod config;

/// Listener registry shared by the auth store and the realtime channel.
pub mod observer;

/// Persistent realtime channel and notification inbox.
pub mod realtime;

pub use api::{ApiClient, ApiResponse, ResponseCache, RetryPolicy, with_retry};
pub use auth::{AuthController, AuthState, AuthUser, CredentialSource, UserRole};
pub use config::{AuthMode, ConfigError, RuntimeConfig};
pub use observer::Subscription;
pub use realtime::{ChannelMessage, ConnectionState, NotificationCenter, RealtimeClient};
