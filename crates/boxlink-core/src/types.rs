//! # Domain Types
//!
//! Core domain types used throughout boxlink.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     BoxRef      │   │   ResolvedBox   │   │   QueueItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  7              │──►│  id (BoxId)     │   │  request_data   │       │
//! │  │  [7]            │   │  network_address│   │  action         │       │
//! │  │  [7, "name"]    │   │  identity       │   │  callback_name  │       │
//! │  └─────────────────┘   └─────────────────┘   │  args, force    │       │
//! │                                               └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ TransportKind   │   │ConnectionStatus │   │  DeviceReply    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  WebRtc         │   │  Unknown        │   │  Success(data)  │       │
//! │  │  LongPolling    │   │  WebRtc / ...   │   │  Failure(data)  │       │
//! │  │  WebSocket      │   │  Offline        │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Box Identity
// =============================================================================

/// Normalized identifier of an IoT box record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxId(i64);

impl BoxId {
    /// Creates a box id from its numeric record id.
    #[inline]
    pub const fn new(id: i64) -> Self {
        BoxId(id)
    }

    /// Returns the numeric record id.
    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BoxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A box reference as callers hand it over.
///
/// Front-end records carry relational fields either as a bare id or wrapped
/// in an array (`[7]` or `[7, "Counter box"]`). Both name the same box and
/// must hit the same cache entry, so every entry point normalizes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoxRef {
    /// Bare numeric id.
    Id(i64),
    /// Array-wrapped id; the first element is the id.
    Relation(Vec<Value>),
}

impl BoxRef {
    /// Reduces the reference to its scalar [`BoxId`].
    pub fn normalize(&self) -> CoreResult<BoxId> {
        match self {
            BoxRef::Id(id) => Ok(BoxId(*id)),
            BoxRef::Relation(values) => {
                let first = values
                    .first()
                    .ok_or_else(|| CoreError::InvalidBoxRef("empty array".to_string()))?;
                first.as_i64().map(BoxId).ok_or_else(|| {
                    CoreError::InvalidBoxRef(format!("expected an integer id, got {first}"))
                })
            }
        }
    }
}

impl From<i64> for BoxRef {
    fn from(id: i64) -> Self {
        BoxRef::Id(id)
    }
}

impl From<BoxId> for BoxRef {
    fn from(id: BoxId) -> Self {
        BoxRef::Id(id.0)
    }
}

impl From<[i64; 1]> for BoxRef {
    fn from(wrapped: [i64; 1]) -> Self {
        BoxRef::Relation(vec![Value::from(wrapped[0])])
    }
}

impl From<Vec<Value>> for BoxRef {
    fn from(values: Vec<Value>) -> Self {
        BoxRef::Relation(values)
    }
}

/// A box whose network location and identity have been looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBox {
    /// Record id of the box.
    pub id: BoxId,

    /// Host (and optional port) the box answers on, e.g. `192.168.1.20`.
    pub network_address: String,

    /// Opaque identity of the box, used as the relay channel name.
    pub identity: String,
}

impl ResolvedBox {
    /// Creates a resolved box.
    pub fn new(id: BoxId, network_address: impl Into<String>, identity: impl Into<String>) -> Self {
        ResolvedBox {
            id,
            network_address: network_address.into(),
            identity: identity.into(),
        }
    }
}

// =============================================================================
// Transports & Status
// =============================================================================

/// One of the channels a box can be reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Peer-to-peer data channel.
    #[serde(rename = "webrtc")]
    WebRtc,
    /// HTTP requests straight to the box.
    #[serde(rename = "longpolling")]
    LongPolling,
    /// Relay through the server bus.
    #[serde(rename = "websocket")]
    WebSocket,
}

impl TransportKind {
    /// Fixed fallback order.
    pub const PRIORITY: [TransportKind; 3] = [
        TransportKind::WebRtc,
        TransportKind::LongPolling,
        TransportKind::WebSocket,
    ];

    /// Wire / log name of the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::WebRtc => "webrtc",
            TransportKind::LongPolling => "longpolling",
            TransportKind::WebSocket => "websocket",
        }
    }

    /// Position in [`TransportKind::PRIORITY`] (lower is tried first).
    pub fn rank(&self) -> usize {
        match self {
            TransportKind::WebRtc => 0,
            TransportKind::LongPolling => 1,
            TransportKind::WebSocket => 2,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webrtc" => Ok(TransportKind::WebRtc),
            "longpolling" | "long_polling" | "http" => Ok(TransportKind::LongPolling),
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            other => Err(CoreError::Validation(
                crate::error::ValidationError::InvalidFormat {
                    field: "transport".to_string(),
                    reason: format!("unknown transport '{other}'"),
                },
            )),
        }
    }
}

/// Last-known transport outcome of the orchestrator.
///
/// Overwritten on every attempt; only used for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No delivery attempted yet.
    #[default]
    Unknown,
    /// Last attempt went through WebRTC.
    #[serde(rename = "webrtc")]
    WebRtc,
    /// Last attempt went through long-polling.
    #[serde(rename = "longpolling")]
    LongPolling,
    /// Last attempt went through the WebSocket relay.
    #[serde(rename = "websocket")]
    WebSocket,
    /// Every transport was unreachable.
    Offline,
}

impl ConnectionStatus {
    /// Returns true if the last attempt reached a box.
    pub fn is_online(&self) -> bool {
        !matches!(self, ConnectionStatus::Unknown | ConnectionStatus::Offline)
    }
}

impl From<TransportKind> for ConnectionStatus {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::WebRtc => ConnectionStatus::WebRtc,
            TransportKind::LongPolling => ConnectionStatus::LongPolling,
            TransportKind::WebSocket => ConnectionStatus::WebSocket,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Unknown => write!(f, "unknown"),
            ConnectionStatus::WebRtc => write!(f, "webrtc"),
            ConnectionStatus::LongPolling => write!(f, "longpolling"),
            ConnectionStatus::WebSocket => write!(f, "websocket"),
            ConnectionStatus::Offline => write!(f, "offline"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Identifier correlating an outbound action with the box's reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generates a fresh random action id.
    pub fn generate() -> Self {
        ActionId(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActionId {
    fn from(id: String) -> Self {
        ActionId(id)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        ActionId(id.to_string())
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of message sent to a box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageType {
    /// Device action (print, weigh, pay...).
    #[default]
    Action,
    /// Any other message type understood by the box.
    Custom(String),
}

impl MessageType {
    /// Wire name of the message type.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Action => "iot_action",
            MessageType::Custom(name) => name,
        }
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        match name {
            "iot_action" => MessageType::Action,
            other => MessageType::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply of a box once a message has been delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceReply {
    /// The device executed the action.
    Success(Value),
    /// The device was reached but reported an error.
    Failure(Value),
}

impl DeviceReply {
    /// Interprets a raw reply message.
    ///
    /// The box tags its replies with `status` either at the top level or under
    /// `result`; `"success"` and `"ok"` mean success, anything else is a
    /// device failure. Replies without a status carry plain result data and
    /// count as success.
    pub fn from_message(message: Value) -> Self {
        let status = message
            .get("status")
            .or_else(|| message.get("result").and_then(|r| r.get("status")))
            .and_then(Value::as_str)
            .map(str::to_lowercase);

        match status.as_deref() {
            None | Some("success") | Some("ok") => DeviceReply::Success(message),
            Some(_) => DeviceReply::Failure(message),
        }
    }

    /// Returns true for [`DeviceReply::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceReply::Success(_))
    }

    /// Returns the reply data.
    pub fn into_data(self) -> Value {
        match self {
            DeviceReply::Success(data) | DeviceReply::Failure(data) => data,
        }
    }
}

/// One call to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    /// Box to reach.
    pub target: BoxRef,

    /// Device identifier on the box (printer, scale, terminal...).
    pub device_id: String,

    /// Opaque business payload.
    pub payload: Value,
}

impl DeliveryRequest {
    /// Creates a delivery request.
    pub fn new(target: impl Into<BoxRef>, device_id: impl Into<String>, payload: Value) -> Self {
        DeliveryRequest {
            target: target.into(),
            device_id: device_id.into(),
            payload,
        }
    }
}

// =============================================================================
// Blackbox Queue Items
// =============================================================================

/// A fiscal request waiting in the blackbox queue.
///
/// ## Lifecycle
/// ```text
/// enqueue ──► persisted ──► drained into a batch ──► response dispatched
///                 ▲                    │
///                 └── batch failed ────┘  (unless `force`: dropped)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Request body for the blackbox.
    pub request_data: Value,

    /// Blackbox action name (e.g. `registerReceipt`).
    pub action: String,

    /// Name of the response handler; `None` dispatches to the identity handler.
    #[serde(default)]
    pub callback_name: Option<String>,

    /// Extra arguments passed to the handler.
    #[serde(default)]
    pub args: Vec<Value>,

    /// Flush immediately, never re-queue after a batch failure.
    #[serde(default)]
    pub force: bool,

    /// When the item entered the queue.
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    /// Creates a queue item dispatched to the identity handler.
    pub fn new(request_data: Value, action: impl Into<String>) -> Self {
        QueueItem {
            request_data,
            action: action.into(),
            callback_name: None,
            args: Vec::new(),
            force: false,
            enqueued_at: Utc::now(),
        }
    }

    /// Sets the response handler name.
    pub fn callback(mut self, name: impl Into<String>) -> Self {
        self.callback_name = Some(name.into());
        self
    }

    /// Sets the handler arguments.
    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Marks the item as force-flushed.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Serializes a queue for durable storage.
pub fn encode_queue(items: &[QueueItem]) -> CoreResult<String> {
    serde_json::to_string(items).map_err(|e| CoreError::CorruptQueue(e.to_string()))
}

/// Reads a queue back from durable storage.
pub fn decode_queue(raw: &str) -> CoreResult<Vec<QueueItem>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| CoreError::CorruptQueue(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_box_ref_normalization() {
        assert_eq!(BoxRef::from(1i64).normalize().unwrap(), BoxId::new(1));
        assert_eq!(BoxRef::from([1i64]).normalize().unwrap(), BoxId::new(1));

        let relation: BoxRef = serde_json::from_value(json!([4, "Counter box"])).unwrap();
        assert_eq!(relation.normalize().unwrap(), BoxId::new(4));

        let scalar: BoxRef = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(scalar, BoxRef::Id(4));
    }

    #[test]
    fn test_box_ref_rejects_malformed_arrays() {
        assert!(BoxRef::Relation(vec![]).normalize().is_err());
        assert!(BoxRef::Relation(vec![json!("abc")]).normalize().is_err());
    }

    #[test]
    fn test_transport_priority_order() {
        let ranks: Vec<usize> = TransportKind::PRIORITY.iter().map(|k| k.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(TransportKind::WebRtc.to_string(), "webrtc");
        assert_eq!("ws".parse::<TransportKind>().unwrap(), TransportKind::WebSocket);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_connection_status_from_transport() {
        assert_eq!(ConnectionStatus::from(TransportKind::LongPolling), ConnectionStatus::LongPolling);
        assert!(ConnectionStatus::WebSocket.is_online());
        assert!(!ConnectionStatus::Offline.is_online());
        assert_eq!(ConnectionStatus::default().to_string(), "unknown");
    }

    #[test]
    fn test_device_reply_status() {
        assert!(DeviceReply::from_message(json!({"status": "success"})).is_success());
        assert!(DeviceReply::from_message(json!({"result": {"status": "ok"}})).is_success());
        assert!(DeviceReply::from_message(json!({"weight": 1.25})).is_success());
        assert!(!DeviceReply::from_message(json!({"status": "error", "message": "paper out"})).is_success());
    }

    #[test]
    fn test_message_type_wire_name() {
        assert_eq!(MessageType::default().as_str(), "iot_action");
        assert_eq!(MessageType::Custom("restart".into()).as_str(), "restart");
        assert_eq!(MessageType::from("iot_action"), MessageType::Action);
        assert_eq!(
            MessageType::from("restart"),
            MessageType::Custom("restart".into())
        );
    }

    #[test]
    fn test_queue_snapshot_preserves_order() {
        let items = vec![
            QueueItem::new(json!({"n": 1}), "registerReceipt"),
            QueueItem::new(json!({"n": 2}), "registerReceipt").callback("onTicket"),
            QueueItem::new(json!({"n": 3}), "closeShift").force(),
        ];
        let raw = encode_queue(&items).unwrap();
        let back = decode_queue(&raw).unwrap();
        assert_eq!(back, items);
        assert!(decode_queue("").unwrap().is_empty());
        assert!(decode_queue("{not json").is_err());
    }

    #[test]
    fn test_queue_item_defaults_on_old_snapshots() {
        let item: QueueItem =
            serde_json::from_value(json!({"request_data": {}, "action": "ping"})).unwrap();
        assert!(item.callback_name.is_none());
        assert!(item.args.is_empty());
        assert!(!item.force);
    }
}
