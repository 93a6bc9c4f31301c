//! Realtime channel error types.

use thiserror::Error;

/// Errors raised inside the realtime channel.
///
/// None of these cross the client's public boundary; they are logged and
/// turned into lifecycle events or `false` return values.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No signed-in user or credential to connect with
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The configured endpoint could not be turned into a connection URL
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded or decoded
    #[error("Invalid message: {0}")]
    Codec(#[from] serde_json::Error),

    /// The connection is not open
    #[error("Connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::Transport(err.to_string())
    }
}

/// Result type for realtime channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
