//! # WebRTC Transport
//!
//! Sends messages over a peer data channel opened by the host platform.
//!
//! The signalling and ICE negotiation live outside this crate: the host
//! implements [`DataChannel`] for whatever peer connections it manages and
//! feeds inbound data-channel text to [`WebRtcTransport::handle_incoming`].
//!
//! ```text
//! host platform                          WebRtcTransport
//! ─────────────                          ───────────────
//! peer connection per box   ◄── send_text(identity, json) ── send_message
//! on data-channel message   ──► handle_incoming(text) ──► ReplyRouter
//!                                                          │
//!                                     await_reply ◄────────┘
//! ```

use async_trait::async_trait;
use boxlink_core::{ActionId, DeviceReply, ResolvedBox, TransportKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::replies::ReplyRouter;
use crate::transport::{OutboundMessage, Transport};

/// Data channels owned by the host platform, addressed by box identity.
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Returns true if an open channel to the box exists.
    fn is_open(&self, identity: &str) -> bool;

    /// Writes one text frame on the box's channel.
    async fn send_text(&self, identity: &str, text: String) -> TransportResult<()>;
}

/// Transport over platform-managed WebRTC data channels.
pub struct WebRtcTransport {
    channel: Arc<dyn DataChannel>,
    replies: ReplyRouter,
    reply_timeout: Duration,
}

impl WebRtcTransport {
    /// Creates the transport on top of the host's data channels.
    pub fn new(channel: Arc<dyn DataChannel>) -> Self {
        WebRtcTransport {
            channel,
            replies: ReplyRouter::new(),
            reply_timeout: Duration::from_secs(30),
        }
    }

    /// Sets how long `await_reply` waits before giving up. Default: 30s.
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Routes a text frame received on a data channel.
    ///
    /// Returns false if the frame is not a reply anyone is waiting for.
    pub async fn handle_incoming(&self, text: &str) -> bool {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.replies.dispatch(message).await,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed data-channel frame");
                false
            }
        }
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebRtc
    }

    async fn send_message(
        &self,
        target: &ResolvedBox,
        message: OutboundMessage<'_>,
    ) -> TransportResult<ActionId> {
        if !self.channel.is_open(&target.identity) {
            return Err(TransportError::Unavailable(format!(
                "no WebRTC data channel to {}",
                target.identity
            )));
        }

        let text = serde_json::to_string(&message.envelope())?;

        self.replies.register(message.action_id).await;
        if let Err(e) = self.channel.send_text(&target.identity, text).await {
            self.replies.cancel(message.action_id).await;
            return Err(e);
        }

        debug!(box_id = %target.id, action_id = %message.action_id, "Sent over data channel");
        Ok(message.action_id.clone())
    }

    async fn await_reply(
        &self,
        _target: &ResolvedBox,
        _device_id: &str,
        action_id: &ActionId,
    ) -> TransportResult<DeviceReply> {
        self.replies.wait(action_id, self.reply_timeout).await
    }

    async fn cancel(&self, action_id: &ActionId) {
        self.replies.cancel(action_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxlink_core::{BoxId, MessageType};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        open: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DataChannel for RecordingChannel {
        fn is_open(&self, _identity: &str) -> bool {
            self.open
        }

        async fn send_text(&self, identity: &str, text: String) -> TransportResult<()> {
            self.sent.lock().unwrap().push((identity.to_string(), text));
            Ok(())
        }
    }

    fn target() -> ResolvedBox {
        ResolvedBox::new(BoxId::new(1), "10.0.0.1", "box-one")
    }

    #[tokio::test]
    async fn test_unavailable_without_open_channel() {
        let transport = WebRtcTransport::new(Arc::new(RecordingChannel::default()));
        let payload = json!({});
        let action_id = ActionId::from("a-1");

        let outcome = transport
            .send_message(
                &target(),
                OutboundMessage {
                    device_id: "printer",
                    payload: &payload,
                    action_id: &action_id,
                    message_type: &MessageType::Action,
                },
            )
            .await;

        assert!(matches!(outcome, Err(TransportError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_send_then_reply_through_data_channel() {
        let channel = Arc::new(RecordingChannel {
            open: true,
            ..Default::default()
        });
        let transport = WebRtcTransport::new(channel.clone());
        let payload = json!({"weight": true});
        let action_id = ActionId::from("a-2");

        let sent_id = transport
            .send_message(
                &target(),
                OutboundMessage {
                    device_id: "scale",
                    payload: &payload,
                    action_id: &action_id,
                    message_type: &MessageType::Action,
                },
            )
            .await
            .unwrap();
        assert_eq!(sent_id, action_id);

        let (identity, text) = channel.sent.lock().unwrap()[0].clone();
        assert_eq!(identity, "box-one");
        assert!(text.contains("\"device_identifier\":\"scale\""));

        assert!(
            transport
                .handle_incoming(r#"{"action_id":"a-2","status":"success","result":{"weight":1.5}}"#)
                .await
        );
        assert!(!transport.handle_incoming("not json").await);

        let reply = transport
            .await_reply(&target(), "scale", &action_id)
            .await
            .unwrap();
        assert_eq!(reply.into_data()["result"]["weight"], 1.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_box_times_out() {
        let channel = Arc::new(RecordingChannel {
            open: true,
            ..Default::default()
        });
        let transport =
            WebRtcTransport::new(channel).with_reply_timeout(Duration::from_secs(2));
        let payload = json!({});
        let action_id = ActionId::from("a-3");

        transport
            .send_message(
                &target(),
                OutboundMessage {
                    device_id: "printer",
                    payload: &payload,
                    action_id: &action_id,
                    message_type: &MessageType::Action,
                },
            )
            .await
            .unwrap();

        let outcome = transport.await_reply(&target(), "printer", &action_id).await;
        assert!(matches!(outcome, Err(TransportError::Timeout(2000))));
    }
}
