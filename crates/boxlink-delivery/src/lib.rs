//! # boxlink-delivery: Multi-Transport Delivery Engine
//!
//! Delivers device actions to IoT boxes over whichever transport works, and
//! batches fiscal requests for the blackbox behind a durable queue.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Delivery Architecture                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      BlackboxQueue                               │  │
//! │  │  enqueue ─► persist (KvStore) ─► debounce / force ─► flush       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ OrchestratorBatchSender                 │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   DeliveryOrchestrator                           │  │
//! │  │  ConnectionCache ─► BoxDirectory (config / SQLite) on miss       │  │
//! │  │  status: webrtc | longpolling | websocket | offline              │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ priority order                          │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ WebRtcTransport│  │LongPolling     │  │ WebSocketTransport     │    │
//! │  │                │  │Transport       │  │                        │    │
//! │  │ host-supplied  │  │ HTTP to the    │  │ relay bus, replies by  │    │
//! │  │ data channels  │  │ box directly   │  │ action id              │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Transport, delivery and queue errors
//! - [`transport`] - `Transport` trait and outbound message
//! - [`replies`] - Reply correlation by action id
//! - [`webrtc`], [`longpolling`], [`websocket`] - Transport adapters
//! - [`directory`] - Box lookup sources
//! - [`cache`] - Connection cache
//! - [`orchestrator`] - Fallback delivery
//! - [`storage`] - Durable storage for the queue
//! - [`queue`] - Blackbox queue
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boxlink_delivery::{ConnectionCache, DeliveryConfig, DeliveryOrchestrator, StaticDirectory};
//!
//! let config = DeliveryConfig::load_or_default(None);
//! let cache = ConnectionCache::new(Arc::new(StaticDirectory::new(config.static_boxes())));
//! let orchestrator = DeliveryOrchestrator::new(cache, transports, (&config).into());
//!
//! let report = orchestrator.action([7], "printer_0", json!({"receipt": "..."})).await?;
//! println!("via {}", report.transport);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

// Transports
pub mod longpolling;
pub mod replies;
pub mod transport;
pub mod webrtc;
pub mod websocket;

// Delivery
pub mod cache;
pub mod directory;
pub mod orchestrator;

// Blackbox queue
pub mod queue;
pub mod storage;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::ConnectionCache;
pub use config::{BoxEntry, DeliveryConfig, QueueSettings, SessionSettings, TransportSettings};
pub use directory::{BoxDirectory, StaticDirectory};
pub use error::{
    BatchFailure, DeliveryError, DeliveryResult, QueueError, QueueResult, TransportError,
    TransportResult,
};
pub use longpolling::{LongPollingConfig, LongPollingTransport};
pub use orchestrator::{DeliveryOrchestrator, DeliveryReport, OrchestratorConfig, OrchestratorState};
pub use queue::{
    BatchSender, BlackboxQueue, IdentityHandler, OrchestratorBatchSender, QueueConfig,
    ResponseHandler,
};
pub use storage::{KvStore, MemoryStore};
pub use transport::{OutboundMessage, Transport};
pub use webrtc::{DataChannel, WebRtcTransport};
pub use websocket::{ConnectionState, WebSocketConfig, WebSocketTransport};
