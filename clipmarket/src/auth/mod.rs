//! Authentication and session lifecycle.
//!
//! [`AuthController`] owns the published [`AuthState`] and delegates every
//! mode-specific decision to a [`CredentialProvider`]: [`DemoProvider`] for
//! the offline account directory, [`LiveProvider`] for a real identity
//! provider and profile store.

pub mod controller;
pub mod credentials;
pub mod demo;
pub mod errors;
pub mod live;
pub mod models;
pub mod provider;
pub mod rest;
pub mod store;

pub use controller::AuthController;
pub use credentials::{CredentialProvider, CredentialSource, DEMO_ACCESS_TOKEN, StaticCredentials};
pub use demo::{DEMO_PASSWORD, DemoProvider};
pub use errors::{AuthError, AuthResult, ProviderError};
pub use live::LiveProvider;
pub use models::{
    AuthOutcome, AuthState, AuthUser, ProfileRecord, ProfileUpdate, ProviderUser,
    RegisterRequest, Session, UserId, UserRole,
};
pub use provider::{IdentityProvider, ProfileStore, SessionEvent, SignUpResult};
pub use rest::{RestIdentityProvider, RestProfileStore};
pub use store::AuthStore;
