//! Persistent channel client with reconnect, heartbeat and typed dispatch.

use super::{
    errors::{ChannelError, ChannelResult},
    messages::{
        ANY_MESSAGE, CONNECTED, ChannelMessage, DISCONNECTED, HEARTBEAT, MAX_RECONNECT_ATTEMPTS,
        RECONNECTING,
    },
    transport::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connection, Connector, Frame, WsConnector},
};
use crate::{
    auth::CredentialSource,
    backoff::backoff_delay,
    config::RealtimeConfig,
    observer::{ListenerSet, Subscription, lock},
};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

/// Connection state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Build the connection URL: `{base}/{user_id}?token={token}`
pub fn endpoint_url(base: &str, user_id: &str, token: &str) -> ChannelResult<String> {
    let mut url =
        reqwest::Url::parse(base).map_err(|e| ChannelError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ChannelError::InvalidUrl(format!("{base}: cannot carry a path")))?
        .pop_if_empty()
        .push(user_id);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// State shared between the client handle and its supervisor task
struct Shared {
    state: Mutex<ConnectionState>,
    attempt: AtomicU32,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    listeners: Mutex<HashMap<String, Arc<ListenerSet<ChannelMessage>>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn listeners_for(&self, kind: &str) -> Option<Arc<ListenerSet<ChannelMessage>>> {
        lock(&self.listeners).get(kind).cloned()
    }

    /// Fan an inbound message out to its type's listeners, then to the
    /// any-message listeners.
    fn dispatch(&self, message: &ChannelMessage) {
        if let Some(listeners) = self.listeners_for(&message.kind) {
            listeners.emit(message);
        }
        if message.kind != ANY_MESSAGE
            && let Some(listeners) = self.listeners_for(ANY_MESSAGE)
        {
            listeners.emit(message);
        }
    }

    fn emit_lifecycle(&self, kind: &str, payload: Value) {
        if let Some(listeners) = self.listeners_for(kind) {
            listeners.emit(&ChannelMessage::new(kind, payload));
        }
    }
}

enum SessionEnd {
    Shutdown,
    Closed(u16),
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Realtime channel client.
///
/// Holds at most one connection. Dropping the client stops its background
/// task, including any pending reconnect or heartbeat timer.
pub struct RealtimeClient {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialSource>,
    config: RealtimeConfig,
    worker: Mutex<Option<Worker>>,
}

impl RealtimeClient {
    /// Create a WebSocket-backed client
    pub fn new(config: RealtimeConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::with_connector(config, credentials, Arc::new(WsConnector))
    }

    /// Create a client over a custom connector
    pub fn with_connector(
        config: RealtimeConfig,
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                attempt: AtomicU32::new(0),
                outbound: Mutex::new(None),
                listeners: Mutex::new(HashMap::new()),
            }),
            connector,
            credentials,
            config,
            worker: Mutex::new(None),
        }
    }

    /// Open the channel in the background.
    ///
    /// Does nothing if the client is connecting, connected or waiting to
    /// reconnect, or if no signed-in user is available. Returns whether a
    /// new connection sequence was started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> bool {
        let mut worker = lock(&self.worker);
        if let Some(active) = worker.as_ref()
            && !active.handle.is_finished()
        {
            log::debug!("connect() ignored, channel is {:?}", self.state());
            return false;
        }

        if self.credentials.user_id().is_none() || self.credentials.access_token().is_none() {
            log::warn!("Cannot open realtime channel: {}", ChannelError::NotAuthenticated);
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            shared: Arc::clone(&self.shared),
            connector: Arc::clone(&self.connector),
            credentials: Arc::clone(&self.credentials),
            config: self.config.clone(),
            shutdown: shutdown_rx,
        };

        self.shared.attempt.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);
        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle: tokio::spawn(supervisor.run()),
        });
        true
    }

    /// Close the channel with code 1000 and stop reconnecting.
    ///
    /// Resolves once the background task has finished.
    pub async fn disconnect(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(err) = worker.handle.await
                && err.is_panic()
            {
                log::error!("Realtime supervisor panicked: {}", err);
            }
        }

        self.shared.attempt.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Send `{type, payload, timestamp}`. Returns false if the socket is not open.
    pub fn send(&self, kind: &str, payload: Value) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let Some(outbound) = lock(&self.shared.outbound).clone() else {
            return false;
        };

        match ChannelMessage::new(kind, payload).to_json() {
            Ok(json) => outbound.send(json).is_ok(),
            Err(err) => {
                log::warn!("Failed to encode outbound '{}' message: {}", kind, err);
                false
            }
        }
    }

    /// Listen for messages of type `kind`.
    ///
    /// Use [`ANY_MESSAGE`] to receive every inbound message. Lifecycle events
    /// (`connected`, `disconnected`, `reconnecting`, `max_reconnect_attempts`)
    /// are delivered the same way.
    pub fn on(
        &self,
        kind: &str,
        listener: impl Fn(&ChannelMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let listeners = Arc::clone(
            lock(&self.shared.listeners)
                .entry(kind.to_string())
                .or_insert_with(|| Arc::new(ListenerSet::new())),
        );
        listeners.add(Arc::new(listener))
    }

    /// Remove every listener for `kind`
    pub fn off(&self, kind: &str) {
        lock(&self.shared.listeners).remove(kind);
    }

    /// Listeners currently registered for `kind`
    pub fn listener_count(&self, kind: &str) -> usize {
        self.shared
            .listeners_for(kind)
            .map_or(0, |listeners| listeners.len())
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Whether the socket is open; [`RealtimeClient::send`] only succeeds then
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnect attempts made since the last successful open
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.attempt.load(Ordering::SeqCst)
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(worker) = lock(&self.worker).take() {
            let _ = worker.shutdown.send(true);
        }
    }
}

/// Background task driving one connect/reconnect sequence
struct Supervisor {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialSource>,
    config: RealtimeConfig,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    fn endpoint(&self) -> ChannelResult<String> {
        let user_id = self.credentials.user_id().ok_or(ChannelError::NotAuthenticated)?;
        let token = self
            .credentials
            .access_token()
            .ok_or(ChannelError::NotAuthenticated)?;
        endpoint_url(&self.config.url, &user_id, &token)
    }

    async fn run(mut self) {
        loop {
            // Credentials are re-read on every attempt so refreshed tokens apply.
            let url = match self.endpoint() {
                Ok(url) => url,
                Err(err) => {
                    log::warn!("Realtime channel stopped: {}", err);
                    self.shared.set_state(ConnectionState::Disconnected);
                    return;
                }
            };

            self.shared.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                result = self.connector.connect(&url) => Some(result),
                _ = self.shutdown.changed() => None,
            };

            let end = match opened {
                None => SessionEnd::Shutdown,
                Some(Ok(connection)) => self.run_connection(connection).await,
                Some(Err(err)) => {
                    log::warn!("Realtime connection failed: {}", err);
                    SessionEnd::Closed(CLOSE_ABNORMAL)
                }
            };

            self.shared.set_state(ConnectionState::Disconnected);
            let code = match end {
                SessionEnd::Shutdown => {
                    log::info!("Realtime channel closed by client");
                    self.shared.attempt.store(0, Ordering::SeqCst);
                    self.shared
                        .emit_lifecycle(DISCONNECTED, json!({ "code": CLOSE_NORMAL }));
                    return;
                }
                SessionEnd::Closed(code) => code,
            };

            self.shared
                .emit_lifecycle(DISCONNECTED, json!({ "code": code }));
            if code == CLOSE_NORMAL {
                log::info!("Realtime channel closed cleanly by server");
                self.shared.attempt.store(0, Ordering::SeqCst);
                return;
            }

            let attempt = self.shared.attempt.load(Ordering::SeqCst);
            if attempt >= self.config.max_reconnect_attempts {
                log::error!(
                    "Realtime channel gave up after {} reconnect attempts",
                    attempt
                );
                self.shared.emit_lifecycle(
                    MAX_RECONNECT_ATTEMPTS,
                    json!({ "attempts": attempt }),
                );
                return;
            }

            let delay = backoff_delay(self.config.reconnect_interval, attempt);
            self.shared.attempt.store(attempt + 1, Ordering::SeqCst);
            log::info!(
                "Realtime channel closed ({}), reconnecting in {:?} (attempt {}/{})",
                code,
                delay,
                attempt + 1,
                self.config.max_reconnect_attempts
            );
            self.shared.emit_lifecycle(
                RECONNECTING,
                json!({
                    "attempt": attempt + 1,
                    "delayMs": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                }),
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    log::debug!("Pending reconnect cancelled");
                    return;
                }
            }
        }
    }

    async fn run_connection(&mut self, mut connection: Box<dyn Connection>) -> SessionEnd {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        *lock(&self.shared.outbound) = Some(outbound_tx);
        self.shared.attempt.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connected);
        log::info!("Realtime channel connected");
        self.shared.emit_lifecycle(CONNECTED, Value::Null);

        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if let Err(err) = connection.close(CLOSE_NORMAL).await {
                        log::debug!("Close handshake failed: {}", err);
                    }
                    break SessionEnd::Shutdown;
                }
                frame = connection.next_frame() => match frame {
                    Frame::Text(text) => match ChannelMessage::parse(&text) {
                        Ok(message) => self.shared.dispatch(&message),
                        Err(err) => log::warn!("Dropping unreadable channel frame: {}", err),
                    },
                    Frame::Closed { code } => break SessionEnd::Closed(code),
                    Frame::Ignored => {}
                },
                Some(text) = outbound_rx.recv() => {
                    if let Err(err) = connection.send_text(text).await {
                        log::warn!("Failed to send channel message: {}", err);
                    }
                }
                _ = heartbeat.tick() => {
                    match ChannelMessage::new(HEARTBEAT, Value::Null).to_json() {
                        Ok(json) => {
                            if let Err(err) = connection.send_text(json).await {
                                log::warn!("Failed to send heartbeat: {}", err);
                            }
                        }
                        Err(err) => log::error!("Failed to encode heartbeat: {}", err),
                    }
                }
            }
        };

        *lock(&self.shared.outbound) = None;
        end
    }
}
