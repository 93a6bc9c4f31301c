//! Realtime channel: one persistent connection per signed-in user.

pub mod client;
pub mod errors;
pub mod messages;
pub mod notifications;
pub mod transport;

pub use client::{ConnectionState, RealtimeClient, endpoint_url};
pub use errors::{ChannelError, ChannelResult};
pub use messages::{
    ANY_MESSAGE, CONNECTED, ChannelMessage, DISCONNECTED, HEARTBEAT, MAX_RECONNECT_ATTEMPTS,
    NOTIFICATION, NotificationKind, NotificationRecord, RECONNECTING,
};
pub use notifications::NotificationCenter;
pub use transport::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connection, Connector, Frame, WsConnector};
