//! # boxlink-core: Pure Domain Types for IoT Box Delivery
//!
//! This crate holds the types every other boxlink crate speaks: box
//! references, resolved boxes, transport kinds, queue items and the response
//! code rules used by the blackbox queue. It performs no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        boxlink Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                POS front-end / fiscal module callers            │   │
//! │  │     orchestrator.action(box, device, payload)                   │   │
//! │  │     queue.enqueue(item)                                         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 boxlink-delivery (async engine)                 │   │
//! │  │   Orchestrator ── ConnectionCache ── Transports ── Blackbox     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ boxlink-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   codes    │  │   error   │  │ validation│  │   │
//! │  │   │ BoxRef    │  │ Recoverable│  │ CoreError │  │  rules    │  │   │
//! │  │   │ QueueItem │  │ Codes      │  │           │  │           │  │   │
//! │  │   └───────────┘  └────────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Box ids, transports, statuses, queue items
//! - [`codes`] - Response code extraction and the recoverable whitelist
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use boxlink_core::types::{BoxId, BoxRef};
//!
//! // A relational reference `[7, "Counter box"]` names the same box as `7`
//! let wrapped: BoxRef = serde_json::from_str(r#"[7, "Counter box"]"#).unwrap();
//! assert_eq!(wrapped.normalize().unwrap(), BoxId::new(7));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codes;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use codes::RecoverableCodes;
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Prefix of the durable storage key holding a session's blackbox backlog.
///
/// The full key is `pos_bb_queue_<session token>`, so two sessions on the same
/// terminal never share a backlog.
pub const QUEUE_KEY_PREFIX: &str = "pos_bb_queue_";

/// Builds the durable storage key for a session's blackbox queue.
///
/// ```rust
/// assert_eq!(boxlink_core::queue_storage_key("abc"), "pos_bb_queue_abc");
/// ```
pub fn queue_storage_key(session_token: &str) -> String {
    format!("{QUEUE_KEY_PREFIX}{session_token}")
}

/// Maximum length of a device identifier accepted by the boxes.
pub const MAX_DEVICE_ID_LEN: usize = 128;
