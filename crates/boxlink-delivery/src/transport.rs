//! # Transport Adapters
//!
//! Common interface over the three ways a message can reach an IoT box.
//!
//! ## Priority
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Transport Priority                                  │
//! │                                                                         │
//! │  1. WebRTC        peer data channel, lowest latency, platform supplied │
//! │  2. LongPolling   HTTP straight to the box on the local network        │
//! │  3. WebSocket     cloud relay bus, works across networks               │
//! │                                                                         │
//! │  send_message() ──Err──► next transport                                │
//! │       │                                                                 │
//! │       Ok(action_id)                                                     │
//! │       ▼                                                                 │
//! │  await_reply()  ──► DeviceReply::Success / Failure (final)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sending and waiting are split so the orchestrator can tell "could not
//! reach the box" (fall through) from "box answered with an error" (stop).

use async_trait::async_trait;
use boxlink_core::{ActionId, DeviceReply, MessageType, ResolvedBox, TransportKind};
use serde_json::{json, Value};

use crate::error::TransportResult;

/// One message on its way to a box.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    /// Device on the box.
    pub device_id: &'a str,

    /// Business payload, passed through untouched.
    pub payload: &'a Value,

    /// Correlation id for the reply.
    pub action_id: &'a ActionId,

    /// Message type understood by the box.
    pub message_type: &'a MessageType,
}

impl OutboundMessage<'_> {
    /// JSON body shared by the peer-to-peer transports.
    pub fn envelope(&self) -> Value {
        json!({
            "message_type": self.message_type.as_str(),
            "action_id": self.action_id.as_str(),
            "device_identifier": self.device_id,
            "data": self.payload,
        })
    }
}

/// A way of reaching a box.
///
/// Implementations must be cheap to share; the orchestrator holds them as
/// `Arc<dyn Transport>` and may call them from concurrent `action()` calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which transport this is.
    fn kind(&self) -> TransportKind;

    /// Sends a message. `Ok` means the box (or the relay) accepted it.
    ///
    /// Any error is treated as "unreachable" and the next transport is
    /// tried.
    async fn send_message(
        &self,
        target: &ResolvedBox,
        message: OutboundMessage<'_>,
    ) -> TransportResult<ActionId>;

    /// Waits for the reply to a message sent by [`Transport::send_message`].
    async fn await_reply(
        &self,
        target: &ResolvedBox,
        device_id: &str,
        action_id: &ActionId,
    ) -> TransportResult<DeviceReply>;

    /// Forgets a pending reply the caller stopped waiting for.
    async fn cancel(&self, _action_id: &ActionId) {}
}

/// Reads the correlation id out of a reply message.
///
/// Boxes put it at the top level; some relay versions wrap the reply in
/// `data`.
pub fn reply_action_id(message: &Value) -> Option<&str> {
    message
        .get("action_id")
        .or_else(|| message.get("data").and_then(|d| d.get("action_id")))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_routing_fields() {
        let payload = json!({"receipt": "Total 4.20"});
        let action_id = ActionId::from("a-1");
        let message = OutboundMessage {
            device_id: "printer_0",
            payload: &payload,
            action_id: &action_id,
            message_type: &MessageType::Action,
        };

        let envelope = message.envelope();
        assert_eq!(envelope["action_id"], "a-1");
        assert_eq!(envelope["device_identifier"], "printer_0");
        assert_eq!(envelope["message_type"], "iot_action");
        assert_eq!(envelope["data"], payload);
    }

    #[test]
    fn test_reply_action_id_lookup() {
        assert_eq!(reply_action_id(&json!({"action_id": "x"})), Some("x"));
        assert_eq!(
            reply_action_id(&json!({"data": {"action_id": "y"}})),
            Some("y")
        );
        assert_eq!(reply_action_id(&json!({"status": "ok"})), None);
    }
}
