//! Wire messages exchanged over the realtime channel.

use super::errors::ChannelResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Channel that receives every inbound message regardless of type
pub const ANY_MESSAGE: &str = "message";
/// Keep-alive frame sent while connected
pub const HEARTBEAT: &str = "heartbeat";
/// Inbound notification push
pub const NOTIFICATION: &str = "notification";

/// Lifecycle event: the connection opened
pub const CONNECTED: &str = "connected";
/// Lifecycle event: the connection closed; payload `{code}`
pub const DISCONNECTED: &str = "disconnected";
/// Lifecycle event: a reconnect was scheduled; payload `{attempt, delayMs}`
pub const RECONNECTING: &str = "reconnecting";
/// Lifecycle event: the reconnect budget is spent; no further attempts
pub const MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts";

/// Unit of realtime communication, dispatched by `kind`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    timestamp: Option<Value>,
}

impl ChannelMessage {
    /// Create a message stamped with the current time
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Parse an inbound text frame.
    ///
    /// The timestamp may be an RFC 3339 string or epoch milliseconds; a
    /// missing or unreadable timestamp becomes the receive time.
    pub fn parse(text: &str) -> ChannelResult<Self> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        let timestamp = frame
            .timestamp
            .as_ref()
            .and_then(normalize_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            kind: frame.kind,
            payload: frame.payload,
            timestamp,
        })
    }

    pub fn to_json(&self) -> ChannelResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn normalize_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Submission,
    BountyUpdate,
    Payment,
    System,
}

/// Notification pushed to a user over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(default = "generate_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub user_id: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
