//! # WebSocket Transport
//!
//! Reaches boxes through a cloud relay bus over one shared WebSocket.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Relay Connection States                                │
//! │                                                                         │
//! │  ┌────────────┐  send_message()  ┌────────────┐                        │
//! │  │Disconnected│ ───────────────► │ Connecting │                        │
//! │  └────────────┘                  └─────┬──────┘                        │
//! │        ▲                               │                                │
//! │        │                     success   │   failure ──► TransportError  │
//! │        │                               ▼               (next transport) │
//! │        │                        ┌────────────┐                          │
//! │        └──── close / error ──── │ Connected  │ ◄── reader task routes  │
//! │              (pending replies   └────────────┘     replies by action id │
//! │               fail)                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connection is opened lazily by the first send and reopened by the
//! next send after it drops; there is no background reconnect loop.

use async_trait::async_trait;
use boxlink_core::{ActionId, DeviceReply, ResolvedBox, TransportKind};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::DeliveryConfig;
use crate::error::{TransportError, TransportResult};
use crate::replies::ReplyRouter;
use crate::transport::{OutboundMessage, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Type alias for the WebSocket write half.
pub type WsSink = SplitSink<WsStream, WsMessage>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the relay socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and ready.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Relay URL (`ws://` or `wss://`).
    pub url: String,

    /// Session id announced to the relay.
    pub session_id: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// How long `await_reply` waits for the relay to answer.
    pub reply_timeout: Duration,
}

impl WebSocketConfig {
    /// Builds the transport config; `None` if no relay URL is configured.
    pub fn from_config(config: &DeliveryConfig) -> Option<Self> {
        config.websocket_url().map(|url| WebSocketConfig {
            url: url.to_string(),
            session_id: config.session.token.clone(),
            connect_timeout: config.transport.connect_timeout(),
            reply_timeout: config.transport.reply_timeout(),
        })
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Transport over a shared relay WebSocket.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsSink>>>,
    replies: Arc<ReplyRouter>,
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every connect; a reader only tears down its own connection.
    generation: Arc<AtomicU64>,
}

impl WebSocketTransport {
    /// Creates the transport. No connection is opened yet.
    pub fn new(config: WebSocketConfig) -> TransportResult<Self> {
        url::Url::parse(&config.url)?;

        Ok(WebSocketTransport {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            replies: Arc::new(ReplyRouter::new()),
            reader: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Closes the relay connection and fails pending replies.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.send(WsMessage::Close(None)).await;
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        self.replies.fail_all().await;
        *self.state.write().await = ConnectionState::Disconnected;
        info!("Relay connection closed");
    }

    /// Connects with timeout.
    async fn connect_with_timeout(&self) -> TransportResult<WsStream> {
        let connect_future = connect_async(self.config.url.as_str());

        match timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "Relay handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(TransportError::from(e)),
            Err(_) => Err(TransportError::Timeout(
                self.config.connect_timeout.as_millis() as u64,
            )),
        }
    }

    /// Writes one text frame, connecting first if needed.
    async fn send_text(&self, text: String) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;

        if writer.is_none() {
            *self.state.write().await = ConnectionState::Connecting;
            let stream = match self.connect_with_timeout().await {
                Ok(stream) => stream,
                Err(e) => {
                    *self.state.write().await = ConnectionState::Disconnected;
                    return Err(e);
                }
            };

            let (write, read) = stream.split();
            *writer = Some(write);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *self.state.write().await = ConnectionState::Connected;
            info!(url = %self.config.url, generation, "Relay connected");

            let reader = tokio::spawn(read_loop(
                read,
                generation,
                RelayShared {
                    current: self.generation.clone(),
                    writer: self.writer.clone(),
                    replies: self.replies.clone(),
                    state: self.state.clone(),
                },
            ));
            if let Some(previous) = self.reader.lock().await.replace(reader) {
                previous.abort();
            }
        }

        let Some(sink) = writer.as_mut() else {
            return Err(TransportError::Disconnected("relay not connected".into()));
        };

        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
            *writer = None;
            *self.state.write().await = ConnectionState::Disconnected;
            return Err(TransportError::from(e));
        }

        Ok(())
    }
}

/// Handles shared between the transport and its reader task.
struct RelayShared {
    current: Arc<AtomicU64>,
    writer: Arc<Mutex<Option<WsSink>>>,
    replies: Arc<ReplyRouter>,
    state: Arc<RwLock<ConnectionState>>,
}

/// Routes relay frames until the socket closes.
async fn read_loop(mut read: SplitStream<WsStream>, generation: u64, shared: RelayShared) {
    let RelayShared {
        current,
        writer,
        replies,
        state,
    } = shared;

    while let Some(result) = read.next().await {
        match result {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(message) => {
                    if !replies.dispatch(message).await {
                        debug!("Relay frame matched no pending action");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to parse relay frame"),
            },
            Ok(WsMessage::Ping(data)) => {
                if let Some(sink) = writer.lock().await.as_mut() {
                    let _ = sink.send(WsMessage::Pong(data)).await;
                }
            }
            Ok(WsMessage::Close(frame)) => {
                info!(?frame, "Relay sent close frame");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Relay socket error");
                break;
            }
        }
    }

    retire(generation, &current, &writer, &state, &replies).await;
}

/// Tears down connection `generation` after its reader stopped.
///
/// Returns false, touching nothing, if a newer connection replaced it.
async fn retire(
    generation: u64,
    current: &AtomicU64,
    writer: &Mutex<Option<WsSink>>,
    state: &RwLock<ConnectionState>,
    replies: &ReplyRouter,
) -> bool {
    // connects bump the generation while holding the writer lock
    let mut writer = writer.lock().await;
    if current.load(Ordering::SeqCst) != generation {
        debug!(generation, "Stale relay reader exited");
        return false;
    }

    writer.take();
    *state.write().await = ConnectionState::Disconnected;
    replies.fail_all().await;
    true
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn send_message(
        &self,
        target: &ResolvedBox,
        message: OutboundMessage<'_>,
    ) -> TransportResult<ActionId> {
        let frame = json!({
            "type": message.message_type.as_str(),
            "target": target.identity,
            "session_id": self.config.session_id,
            "action_id": message.action_id.as_str(),
            "device_identifier": message.device_id,
            "data": message.payload,
        });
        let text = serde_json::to_string(&frame)?;

        self.replies.register(message.action_id).await;
        if let Err(e) = self.send_text(text).await {
            self.replies.cancel(message.action_id).await;
            return Err(e);
        }

        debug!(box_id = %target.id, action_id = %message.action_id, "Sent through relay");
        Ok(message.action_id.clone())
    }

    async fn await_reply(
        &self,
        _target: &ResolvedBox,
        _device_id: &str,
        action_id: &ActionId,
    ) -> TransportResult<DeviceReply> {
        self.replies.wait(action_id, self.config.reply_timeout).await
    }

    async fn cancel(&self, action_id: &ActionId) {
        self.replies.cancel(action_id).await;
    }
}
