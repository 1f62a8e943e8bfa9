//! # Delivery Error Types
//!
//! Error types for transports, the orchestrator and the blackbox queue.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Delivery Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────┐  ┌────────────────────┐  │
//! │  │ TransportError  │  │   DeliveryError     │  │    QueueError      │  │
//! │  │                 │  │                     │  │                    │  │
//! │  │  Unavailable    │  │  Offline      (all  │  │  Device  (code)    │  │
//! │  │  Connection     │─►│   transports failed)│◄─│  Batch   (code?)   │  │
//! │  │  Timeout        │  │  Device / Timeout   │  │  Storage           │  │
//! │  │  Protocol       │  │   (terminal)        │  │  Handler           │  │
//! │  └─────────────────┘  │  Config / Directory │  └────────────────────┘  │
//! │                       └─────────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `TransportError` never leaves the orchestrator: a failed send means
//! "try the next transport". Once a send succeeds, whatever the box answers
//! is final for that call.

use boxlink_core::codes::response_code;
use boxlink_core::{BoxId, CoreError, RecoverableCodes, TransportKind, ValidationError};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for transport adapters.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type alias for orchestrator and configuration operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Result type alias for blackbox queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure of a single transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has no usable channel to this box.
    #[error("{0} is not available")]
    Unavailable(String),

    /// Could not reach the box or the relay.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection dropped before the exchange finished.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// The box answered with an HTTP error status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// No answer within the allowed time.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Invalid relay or box URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Malformed message on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Returns true if the same call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::ConnectionFailed(_)
            | TransportError::Disconnected(_)
            | TransportError::Timeout(_) => true,
            TransportError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(0)
        } else if let Some(status) = err.status() {
            TransportError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            TransportError::Protocol(err.to_string())
        } else {
            TransportError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                TransportError::Disconnected("relay closed the connection".to_string())
            }
            WsError::Io(io) => TransportError::ConnectionFailed(io.to_string()),
            WsError::Url(url) => TransportError::InvalidUrl(url.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Protocol(err.to_string())
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::InvalidUrl(err.to_string())
    }
}

// =============================================================================
// Delivery Errors
// =============================================================================

/// Failure of one orchestrator call.
#[derive(Debug, Error)]
pub enum DeliveryError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// The target or device id could not be used.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] CoreError),

    /// The directory has no box with this id.
    #[error("IoT box {0} not found")]
    BoxNotFound(BoxId),

    /// The directory lookup itself failed.
    #[error("Directory lookup failed: {0}")]
    Directory(String),

    // =========================================================================
    // Outcome Errors
    // =========================================================================
    /// The box was reached and the device reported an error.
    #[error("Device error via {transport}: {response}")]
    Device {
        transport: TransportKind,
        response: Value,
    },

    /// The message was sent but no reply arrived in time.
    #[error("No reply via {transport} for action {action_id}")]
    ReplyTimeout {
        transport: TransportKind,
        action_id: String,
    },

    /// The message was sent but the reply channel failed.
    #[error("Reply lost via {transport}: {reason}")]
    ReplyLost {
        transport: TransportKind,
        reason: String,
    },

    /// Every transport failed to send.
    #[error("IoT box {box_id} is offline")]
    Offline { box_id: BoxId },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid delivery configuration.
    #[error("Invalid delivery configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Transport could not be built from the configuration.
    #[error("Transport setup failed: {0}")]
    TransportSetup(#[from] TransportError),
}

impl DeliveryError {
    /// Returns true if the box was reached and answered (or was expected to
    /// answer). Such failures must not be retried on another transport.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryError::Device { .. }
                | DeliveryError::ReplyTimeout { .. }
                | DeliveryError::ReplyLost { .. }
        )
    }

    /// Returns true if calling again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Offline { .. } | DeliveryError::Directory(_)
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DeliveryError::InvalidConfig(_)
                | DeliveryError::ConfigLoadFailed(_)
                | DeliveryError::ConfigSaveFailed(_)
                | DeliveryError::TransportSetup(_)
        )
    }

    /// Returns the device response carried by a [`DeliveryError::Device`].
    pub fn device_response(&self) -> Option<&Value> {
        match self {
            DeliveryError::Device { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl From<ValidationError> for DeliveryError {
    fn from(err: ValidationError) -> Self {
        DeliveryError::InvalidRequest(CoreError::Validation(err))
    }
}

impl From<boxlink_db::DbError> for DeliveryError {
    fn from(err: boxlink_db::DbError) -> Self {
        DeliveryError::Directory(err.to_string())
    }
}

impl From<std::io::Error> for DeliveryError {
    fn from(err: std::io::Error) -> Self {
        DeliveryError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DeliveryError {
    fn from(err: toml::de::Error) -> Self {
        DeliveryError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for DeliveryError {
    fn from(err: toml::ser::Error) -> Self {
        DeliveryError::ConfigSaveFailed(err.to_string())
    }
}

impl From<url::ParseError> for DeliveryError {
    fn from(err: url::ParseError) -> Self {
        DeliveryError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Queue Errors
// =============================================================================

/// Why a whole batch could not be delivered to the blackbox.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_failure(.code, .message))]
pub struct BatchFailure {
    /// Blackbox error code, if the failure carried one.
    pub code: Option<String>,

    /// Human readable reason.
    pub message: String,
}

impl BatchFailure {
    /// Creates a failure without a blackbox code.
    pub fn new(message: impl Into<String>) -> Self {
        BatchFailure {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a failure carrying a blackbox code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        BatchFailure {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

fn render_failure(code: &Option<String>, message: &str) -> String {
    match code {
        Some(code) => format!("[{}] {}", code, message),
        None => message.to_string(),
    }
}

impl From<DeliveryError> for BatchFailure {
    fn from(err: DeliveryError) -> Self {
        let code = err.device_response().and_then(response_code);
        BatchFailure {
            code,
            message: err.to_string(),
        }
    }
}

/// Blackbox queue failure.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The blackbox rejected one request with a non-recoverable code.
    #[error("Blackbox error {code}: {message}")]
    Device { code: String, message: String },

    /// The batch as a whole failed.
    #[error("Blackbox batch failed: {0}")]
    Batch(#[from] BatchFailure),

    /// A response handler failed.
    #[error("Response handler '{name}' failed: {reason}")]
    Handler { name: String, reason: String },

    /// Durable storage failed.
    #[error("Queue storage failed: {0}")]
    Storage(String),

    /// The persisted backlog could not be read or written.
    #[error("Queue snapshot invalid: {0}")]
    Snapshot(#[from] CoreError),
}

impl QueueError {
    /// Returns the blackbox code attached to this error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            QueueError::Device { code, .. } => Some(code),
            QueueError::Batch(failure) => failure.code.as_deref(),
            _ => None,
        }
    }

    /// Returns true if the code is in the recoverable whitelist.
    ///
    /// A recoverable failure leaves the drained batch out of the queue.
    pub fn is_recoverable(&self, codes: &RecoverableCodes) -> bool {
        self.code().is_some_and(|code| codes.is_recoverable(code))
    }
}

impl From<boxlink_db::DbError> for QueueError {
    fn from(err: boxlink_db::DbError) -> Self {
        QueueError::Storage(err.to_string())
    }
}

impl From<ValidationError> for QueueError {
    fn from(err: ValidationError) -> Self {
        QueueError::Snapshot(CoreError::Validation(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_transience() {
        assert!(TransportError::ConnectionFailed("refused".into()).is_transient());
        assert!(TransportError::Http {
            status: 502,
            message: "bad gateway".into()
        }
        .is_transient());
        assert!(!TransportError::Http {
            status: 404,
            message: "not found".into()
        }
        .is_transient());
        assert!(!TransportError::Unavailable("WebRTC".into()).is_transient());
    }

    #[test]
    fn test_delivery_error_categories() {
        let device = DeliveryError::Device {
            transport: TransportKind::WebRtc,
            response: json!({"status": "error"}),
        };
        assert!(device.is_terminal());
        assert!(!device.is_retryable());

        let offline = DeliveryError::Offline {
            box_id: BoxId::new(4),
        };
        assert!(!offline.is_terminal());
        assert!(offline.is_retryable());
        assert_eq!(offline.to_string(), "IoT box 4 is offline");

        assert!(DeliveryError::InvalidConfig("x".into()).is_config_error());
    }

    #[test]
    fn test_batch_failure_takes_code_from_device_response() {
        let err = DeliveryError::Device {
            transport: TransportKind::LongPolling,
            response: json!({"status": "error", "error": {"code": "101002"}}),
        };
        let failure = BatchFailure::from(err);
        assert_eq!(failure.code.as_deref(), Some("101002"));

        let offline = BatchFailure::from(DeliveryError::Offline {
            box_id: BoxId::new(1),
        });
        assert_eq!(offline.code, None);
    }

    #[test]
    fn test_batch_failure_display() {
        assert_eq!(
            BatchFailure::with_code("101000", "blackbox busy").to_string(),
            "[101000] blackbox busy"
        );
        assert_eq!(BatchFailure::new("offline").to_string(), "offline");

        let source: &dyn std::error::Error = &BatchFailure::new("offline");
        assert!(source.source().is_none());
    }

    #[test]
    fn test_queue_error_recoverability() {
        let codes = RecoverableCodes::default();

        let soft = QueueError::Batch(BatchFailure::with_code("001003", "paper low"));
        assert!(soft.is_recoverable(&codes));
        assert_eq!(soft.to_string(), "Blackbox batch failed: [001003] paper low");

        let hard = QueueError::Device {
            code: "202000".into(),
            message: "fiscal memory full".into(),
        };
        assert!(!hard.is_recoverable(&codes));

        assert!(!QueueError::Batch(BatchFailure::new("offline")).is_recoverable(&codes));
    }
}
