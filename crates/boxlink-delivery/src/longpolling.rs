//! # Long-Polling Transport
//!
//! Talks HTTP straight to the box on the local network.
//!
//! ## Exchange
//! ```text
//! ┌──────────┐  POST /iot_drivers/action  {session, device, action_id, data}
//! │  client  │ ────────────────────────────────────────────────► ┌───────┐
//! │          │ ◄──────────────────────────────── {"result": true} │  box  │
//! │          │                                                    │       │
//! │          │  POST /iot_drivers/event   {listener: {devices}}   │       │
//! │          │ ────────────────────────────────────────────────► │       │
//! │          │        (held open up to poll_timeout)              │       │
//! │          │ ◄───────────── {"result": event} / {"result": false}│       │
//! └──────────┘                                                    └───────┘
//! ```
//!
//! An empty poll is re-issued immediately; a failed poll backs off
//! exponentially. The whole wait is bounded by `reply_timeout`.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use boxlink_core::{ActionId, DeviceReply, ResolvedBox, TransportKind};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::DeliveryConfig;
use crate::error::{TransportError, TransportResult};
use crate::transport::{reply_action_id, OutboundMessage, Transport};

const ACTION_PATH: &str = "iot_drivers/action";
const EVENT_PATH: &str = "iot_drivers/event";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the long-polling transport.
#[derive(Debug, Clone)]
pub struct LongPollingConfig {
    /// `http` or `https`.
    pub scheme: String,

    /// Session id announced to the box; events carry it back.
    pub session_id: String,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Timeout for the action request.
    pub request_timeout: Duration,

    /// Server-side hold time of one event poll.
    pub poll_timeout: Duration,

    /// Longest total wait for the matching event.
    pub reply_timeout: Duration,

    /// First delay after a failed poll.
    pub initial_backoff: Duration,

    /// Longest delay between failed polls.
    pub max_backoff: Duration,
}

impl Default for LongPollingConfig {
    fn default() -> Self {
        LongPollingConfig {
            scheme: "http".to_string(),
            session_id: String::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(25),
            reply_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&DeliveryConfig> for LongPollingConfig {
    fn from(config: &DeliveryConfig) -> Self {
        LongPollingConfig {
            scheme: config.transport.longpolling_scheme.clone(),
            session_id: config.session.token.clone(),
            connect_timeout: config.transport.connect_timeout(),
            request_timeout: config.transport.reply_timeout(),
            poll_timeout: config.transport.poll_timeout(),
            reply_timeout: config.transport.reply_timeout(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// HTTP long-polling transport.
pub struct LongPollingTransport {
    client: reqwest::Client,
    config: LongPollingConfig,
}

impl LongPollingTransport {
    /// Creates the transport and its HTTP client.
    pub fn new(config: LongPollingConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            // boxes live on the local network
            .no_proxy()
            .build()?;

        Ok(LongPollingTransport { client, config })
    }

    fn endpoint(&self, target: &ResolvedBox, path: &str) -> TransportResult<Url> {
        let url = Url::parse(&format!(
            "{}://{}/{}",
            self.config.scheme, target.network_address, path
        ))?;
        Ok(url)
    }

    /// Posts a JSON-RPC call and returns its `result`.
    async fn call(&self, url: Url, params: Value, timeout: Duration) -> TransportResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": params,
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        let mut rpc: Value = response.json().await?;

        if let Some(error) = rpc.get("error") {
            return Err(TransportError::Protocol(format!("box returned error: {}", error)));
        }

        Ok(rpc.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    /// True if `event` answers `action_id` for this session.
    fn is_reply_to(&self, event: &Value, device_id: &str, action_id: &ActionId) -> bool {
        if let Some(id) = reply_action_id(event) {
            return id == action_id.as_str();
        }

        // boxes that predate action ids tag events with session and device
        let session = event.get("session_id").and_then(Value::as_str);
        let device = event.get("device_identifier").and_then(Value::as_str);
        session == Some(self.config.session_id.as_str()) && device == Some(device_id)
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// Long-polls the event endpoint until the reply to `action_id` shows up.
    async fn poll_until_reply(
        &self,
        target: &ResolvedBox,
        device_id: &str,
        action_id: &ActionId,
    ) -> TransportResult<DeviceReply> {
        let url = self.endpoint(target, EVENT_PATH)?;
        let hold = self.config.poll_timeout + self.config.connect_timeout;
        let mut backoff = self.create_backoff();
        let mut last_event = 0.0_f64;

        loop {
            let params = json!({
                "listener": {
                    "session_id": self.config.session_id,
                    "devices": [device_id],
                    "last_event": last_event,
                }
            });

            match self.call(url.clone(), params, hold).await {
                Ok(event) if event.is_object() => {
                    backoff.reset();
                    if let Some(time) = event.get("time").and_then(Value::as_f64) {
                        last_event = last_event.max(time);
                    }
                    if self.is_reply_to(&event, device_id, action_id) {
                        debug!(box_id = %target.id, action_id = %action_id, "Event received");
                        return Ok(DeviceReply::from_message(event));
                    }
                }
                // poll expired without events
                Ok(_) => backoff.reset(),
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);
                    warn!(box_id = %target.id, error = %e, ?delay, "Event poll failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Transport for LongPollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::LongPolling
    }

    async fn send_message(
        &self,
        target: &ResolvedBox,
        message: OutboundMessage<'_>,
    ) -> TransportResult<ActionId> {
        let url = self.endpoint(target, ACTION_PATH)?;

        debug!(box_id = %target.id, %url, action_id = %message.action_id, "Posting action");

        let params = json!({
            "session_id": self.config.session_id,
            "device_identifier": message.device_id,
            "action_id": message.action_id.as_str(),
            "message_type": message.message_type.as_str(),
            "data": message.payload,
        });

        let accepted = self.call(url, params, self.config.request_timeout).await?;
        if accepted == Value::Bool(false) {
            return Err(TransportError::Unavailable(format!(
                "device {} is not connected to box {}",
                message.device_id, target.id
            )));
        }

        Ok(message.action_id.clone())
    }

    async fn await_reply(
        &self,
        target: &ResolvedBox,
        device_id: &str,
        action_id: &ActionId,
    ) -> TransportResult<DeviceReply> {
        let limit = self.config.reply_timeout;
        let poll = self.poll_until_reply(target, device_id, action_id);

        match tokio::time::timeout(limit, poll).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(box_id = %target.id, action_id = %action_id, "No event within reply timeout");
                Err(TransportError::Timeout(limit.as_millis() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxlink_core::{BoxId, MessageType};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Minimal HTTP server answering each connection with the next body.
    async fn serve(bodies: Vec<Value>) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for body in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);

                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            requests
        });

        (addr, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn transport() -> LongPollingTransport {
        LongPollingTransport::new(LongPollingConfig {
            session_id: "session-1".into(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .unwrap()
    }

    fn target(addr: SocketAddr) -> ResolvedBox {
        ResolvedBox::new(BoxId::new(1), addr.to_string(), "box-one")
    }

    #[tokio::test]
    async fn test_send_posts_action_and_poll_matches_reply() {
        let (addr, server) = serve(vec![
            json!({"jsonrpc": "2.0", "result": true}),
            json!({"jsonrpc": "2.0", "result": false}),
            json!({"jsonrpc": "2.0", "result": {"action_id": "other", "time": 1.0}}),
            json!({"jsonrpc": "2.0", "result": {"action_id": "a-1", "status": "success", "time": 2.0}}),
        ])
        .await;

        let transport = transport();
        let payload = json!({"receipt": "..."});
        let action_id = ActionId::from("a-1");

        let sent = transport
            .send_message(
                &target(addr),
                OutboundMessage {
                    device_id: "printer",
                    payload: &payload,
                    action_id: &action_id,
                    message_type: &MessageType::Action,
                },
            )
            .await
            .unwrap();
        assert_eq!(sent, action_id);

        let reply = transport
            .await_reply(&target(addr), "printer", &action_id)
            .await
            .unwrap();
        assert!(reply.is_success());

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /iot_drivers/action"));
        assert!(requests[0].contains("\"session_id\":\"session-1\""));
        assert!(requests[1].starts_with("POST /iot_drivers/event"));
        // last_event advances past the foreign event
        assert!(requests[3].contains("\"last_event\":1.0"));
    }

    #[tokio::test]
    async fn test_disconnected_device_is_unavailable() {
        let (addr, _server) = serve(vec![json!({"jsonrpc": "2.0", "result": false})]).await;
        let payload = json!({});
        let action_id = ActionId::generate();

        let outcome = transport()
            .send_message(
                &target(addr),
                OutboundMessage {
                    device_id: "scale",
                    payload: &payload,
                    action_id: &action_id,
                    message_type: &MessageType::Action,
                },
            )
            .await;

        assert!(matches!(outcome, Err(TransportError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_box_is_a_transient_error() {
        // bind then drop to get a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let payload = json!({});
        let action_id = ActionId::generate();

        let err = transport()
            .send_message(
                &target(addr),
                OutboundMessage {
                    device_id: "scale",
                    payload: &payload,
                    action_id: &action_id,
                    message_type: &MessageType::Action,
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_transient(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_legacy_events_match_on_session_and_device() {
        let transport = transport();
        let action_id = ActionId::from("a-9");

        let legacy = json!({"session_id": "session-1", "device_identifier": "printer"});
        assert!(transport.is_reply_to(&legacy, "printer", &action_id));
        assert!(!transport.is_reply_to(&legacy, "scale", &action_id));

        let tagged = json!({"action_id": "a-8", "session_id": "session-1", "device_identifier": "printer"});
        assert!(!transport.is_reply_to(&tagged, "printer", &action_id));
    }

    #[tokio::test]
    async fn test_silent_box_times_out_in_transport() {
        // one empty poll, then the box goes away
        let (addr, _server) = serve(vec![json!({"jsonrpc": "2.0", "result": false})]).await;
        let transport = LongPollingTransport::new(LongPollingConfig {
            session_id: "session-1".into(),
            connect_timeout: Duration::from_millis(200),
            poll_timeout: Duration::from_millis(200),
            reply_timeout: Duration::from_millis(400),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(100),
            ..Default::default()
        })
        .unwrap();

        let outcome = transport
            .await_reply(&target(addr), "printer", &ActionId::from("a-5"))
            .await;

        assert!(matches!(outcome, Err(TransportError::Timeout(400))));
    }
}
