//! # Delivery Orchestrator
//!
//! Delivers one action to one device, trying transports in priority order.
//!
//! ## Fallback
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        action(box, device, payload)                     │
//! │                                                                         │
//! │  cache.resolve(box) ──► ResolvedBox                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────┐  send Err  ┌─────────────┐  send Err  ┌───────────┐       │
//! │  │ WebRTC  │ ─────────► │ LongPolling │ ─────────► │ WebSocket │ ──┐   │
//! │  └────┬────┘            └──────┬──────┘            └─────┬─────┘   │   │
//! │       │ send Ok                │ send Ok                 │ send Ok │   │
//! │       ▼                        ▼                         ▼         ▼   │
//! │  await_reply ──► Success ──► Ok(report)           evict box from   │
//! │              ──► Failure ──► Err(Device)  (final) cache, status =  │
//! │              ──► Timeout ──► Err(ReplyTimeout)    offline,         │
//! │                                                   Err(Offline)     │
//! │                                                                         │
//! │  LongPolling is skipped for `longpolling_retry_after` after it failed. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Once a send succeeded the box may already have acted, so nothing after
//! that point falls through to another transport.
//!
//! Each transport bounds its own reply wait. The orchestrator adds no
//! timeout of its own unless `delivery_timeout` is set.

use boxlink_core::validation::validate_device_id;
use boxlink_core::{
    ActionId, BoxId, BoxRef, ConnectionStatus, DeliveryRequest, DeviceReply, MessageType,
    TransportKind,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::ConnectionCache;
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult, TransportError};
use crate::transport::{OutboundMessage, Transport};

// =============================================================================
// Configuration
// =============================================================================

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Extra bound on a reply wait, on top of the transport's own.
    /// `None` waits for whatever the transport returns.
    pub delivery_timeout: Option<Duration>,

    /// How long long-polling is skipped after it failed to send.
    pub longpolling_retry_after: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            delivery_timeout: None,
            longpolling_retry_after: Duration::from_secs(60),
        }
    }
}

impl From<&DeliveryConfig> for OrchestratorConfig {
    fn from(config: &DeliveryConfig) -> Self {
        OrchestratorConfig {
            delivery_timeout: config.transport.delivery_timeout(),
            longpolling_retry_after: config.transport.longpolling_retry_after(),
        }
    }
}

// =============================================================================
// State & Report
// =============================================================================

/// Mutable orchestrator state.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorState {
    /// Transport used by the last attempt, or offline.
    pub status: ConnectionStatus,

    /// When long-polling last failed to send.
    pub longpolling_failed_at: Option<Instant>,
}

/// Successful delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// Box the action went to.
    pub box_id: BoxId,

    /// Transport that carried it.
    pub transport: TransportKind,

    /// Correlation id of the action.
    pub action_id: ActionId,

    /// Device reply.
    pub response: Value,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Multi-transport delivery with fallback.
///
/// ## Usage
/// ```rust,ignore
/// let orchestrator = DeliveryOrchestrator::new(
///     ConnectionCache::new(Arc::new(directory)),
///     vec![Arc::new(longpolling), Arc::new(websocket)],
///     OrchestratorConfig::from(&config),
/// );
///
/// let report = orchestrator.action(7, "printer_0", json!({"receipt": "..."})).await?;
/// println!("printed via {}", report.transport);
/// ```
pub struct DeliveryOrchestrator {
    cache: ConnectionCache,
    transports: Vec<Arc<dyn Transport>>,
    config: OrchestratorConfig,
    state: RwLock<OrchestratorState>,
}

impl DeliveryOrchestrator {
    /// Creates an orchestrator.
    ///
    /// Transports are ordered by priority whatever order they are given in;
    /// a second transport of the same kind is ignored.
    pub fn new(
        cache: ConnectionCache,
        transports: Vec<Arc<dyn Transport>>,
        config: OrchestratorConfig,
    ) -> Self {
        let mut ordered: Vec<Arc<dyn Transport>> = Vec::with_capacity(transports.len());
        for transport in transports {
            if ordered.iter().any(|t| t.kind() == transport.kind()) {
                warn!(transport = %transport.kind(), "Duplicate transport ignored");
                continue;
            }
            ordered.push(transport);
        }
        ordered.sort_by_key(|t| t.kind().rank());

        info!(
            transports = ?ordered.iter().map(|t| t.kind().as_str()).collect::<Vec<_>>(),
            "Delivery orchestrator ready"
        );

        DeliveryOrchestrator {
            cache,
            transports: ordered,
            config,
            state: RwLock::new(OrchestratorState::default()),
        }
    }

    /// Sends `payload` to `device_id` on the target box.
    pub async fn action(
        &self,
        target: impl Into<BoxRef>,
        device_id: &str,
        payload: Value,
    ) -> DeliveryResult<DeliveryReport> {
        let request = DeliveryRequest::new(target, device_id, payload);
        self.deliver(&request, None, &MessageType::Action).await
    }

    /// Like [`DeliveryOrchestrator::action`] with a caller-chosen action id,
    /// so a retried action keeps its id.
    pub async fn action_with_id(
        &self,
        target: impl Into<BoxRef>,
        device_id: &str,
        payload: Value,
        action_id: ActionId,
    ) -> DeliveryResult<DeliveryReport> {
        let request = DeliveryRequest::new(target, device_id, payload);
        self.deliver(&request, Some(action_id), &MessageType::Action)
            .await
    }

    /// Delivers a request. A missing action id is generated.
    pub async fn deliver(
        &self,
        request: &DeliveryRequest,
        action_id: Option<ActionId>,
        message_type: &MessageType,
    ) -> DeliveryResult<DeliveryReport> {
        let box_id = request.target.normalize()?;
        validate_device_id(&request.device_id)?;

        let resolved = self.cache.resolve_id(box_id).await?;
        let action_id = action_id.unwrap_or_else(ActionId::generate);

        let message = OutboundMessage {
            device_id: &request.device_id,
            payload: &request.payload,
            action_id: &action_id,
            message_type,
        };

        for transport in &self.transports {
            let kind = transport.kind();

            if kind == TransportKind::LongPolling && self.longpolling_suppressed().await {
                debug!(box_id = %box_id, "Skipping long-polling after recent failure");
                continue;
            }

            let sent_id = match transport.send_message(&resolved, message).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(box_id = %box_id, transport = %kind, error = %e, "Send failed, trying next transport");
                    if kind == TransportKind::LongPolling {
                        self.state.write().await.longpolling_failed_at = Some(Instant::now());
                    }
                    continue;
                }
            };

            self.set_status(kind.into()).await;
            debug!(box_id = %box_id, transport = %kind, action_id = %sent_id, "Sent, awaiting reply");

            let waiting = transport.await_reply(&resolved, &request.device_id, &sent_id);
            let reply = match self.config.delivery_timeout {
                Some(limit) => tokio::time::timeout(limit, waiting).await.map_err(|_| limit),
                None => Ok(waiting.await),
            };

            return match reply {
                Ok(Ok(DeviceReply::Success(response))) => {
                    info!(box_id = %box_id, transport = %kind, action_id = %sent_id, "Action delivered");
                    Ok(DeliveryReport {
                        box_id,
                        transport: kind,
                        action_id: sent_id,
                        response,
                    })
                }
                Ok(Ok(DeviceReply::Failure(response))) => {
                    warn!(box_id = %box_id, transport = %kind, "Device reported failure");
                    Err(DeliveryError::Device {
                        transport: kind,
                        response,
                    })
                }
                Ok(Err(TransportError::Timeout(_))) | Err(_) => {
                    transport.cancel(&sent_id).await;
                    warn!(box_id = %box_id, transport = %kind, action_id = %sent_id, "Reply timed out");
                    Err(DeliveryError::ReplyTimeout {
                        transport: kind,
                        action_id: sent_id.to_string(),
                    })
                }
                Ok(Err(e)) => {
                    transport.cancel(&sent_id).await;
                    warn!(box_id = %box_id, transport = %kind, error = %e, "Reply lost");
                    Err(DeliveryError::ReplyLost {
                        transport: kind,
                        reason: e.to_string(),
                    })
                }
            };
        }

        self.cache.invalidate(box_id).await;
        self.set_status(ConnectionStatus::Offline).await;
        warn!(box_id = %box_id, "All transports failed");

        Err(DeliveryError::Offline { box_id })
    }

    /// Returns the transport used by the last attempt.
    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    /// Returns a copy of the orchestrator state.
    pub async fn state(&self) -> OrchestratorState {
        self.state.read().await.clone()
    }

    /// True while long-polling is being skipped.
    pub async fn longpolling_suppressed(&self) -> bool {
        match self.state.read().await.longpolling_failed_at {
            Some(at) => at.elapsed() < self.config.longpolling_retry_after,
            None => false,
        }
    }

    /// Returns the connection cache.
    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    /// Transport kinds in the order they are tried.
    pub fn transport_order(&self) -> Vec<TransportKind> {
        self.transports.iter().map(|t| t.kind()).collect()
    }

    async fn set_status(&self, status: ConnectionStatus) {
        let mut state = self.state.write().await;
        if state.status != status {
            debug!(from = %state.status, to = %status, "Connection status changed");
        }
        state.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{BoxDirectory, StaticDirectory};
    use crate::error::TransportResult;
    use async_trait::async_trait;
    use boxlink_core::ResolvedBox;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // =========================================================================
    // Scripted transport
    // =========================================================================

    #[derive(Clone)]
    enum Reply {
        Success(Value),
        Failure(Value),
        TimedOut,
        Hang,
    }

    struct Scripted {
        kind: TransportKind,
        send_ok: bool,
        offline_box: Option<BoxId>,
        reply: Reply,
        sends: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl Scripted {
        fn new(kind: TransportKind, send_ok: bool, reply: Reply) -> Arc<Self> {
            Arc::new(Scripted {
                kind,
                send_ok,
                offline_box: None,
                reply,
                sends: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
            })
        }

        fn failing(kind: TransportKind) -> Arc<Self> {
            Self::new(kind, false, Reply::Hang)
        }

        fn succeeding(kind: TransportKind) -> Arc<Self> {
            Self::new(kind, true, Reply::Success(json!({"status": "success"})))
        }

        /// Succeeds for every box except `offline`.
        fn unreachable_box(kind: TransportKind, offline: BoxId) -> Arc<Self> {
            Arc::new(Scripted {
                kind,
                send_ok: true,
                offline_box: Some(offline),
                reply: Reply::Success(json!({"status": "success"})),
                sends: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
            })
        }

        fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn send_message(
            &self,
            target: &ResolvedBox,
            message: OutboundMessage<'_>,
        ) -> TransportResult<ActionId> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.send_ok && self.offline_box != Some(target.id) {
                Ok(message.action_id.clone())
            } else {
                Err(TransportError::ConnectionFailed("scripted".into()))
            }
        }

        async fn await_reply(
            &self,
            _target: &ResolvedBox,
            _device_id: &str,
            _action_id: &ActionId,
        ) -> TransportResult<DeviceReply> {
            match self.reply.clone() {
                Reply::Success(v) => Ok(DeviceReply::Success(v)),
                Reply::Failure(v) => Ok(DeviceReply::Failure(v)),
                Reply::TimedOut => Err(TransportError::Timeout(30_000)),
                Reply::Hang => std::future::pending().await,
            }
        }

        async fn cancel(&self, _action_id: &ActionId) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Directory that counts lookups.
    struct CountingDirectory {
        inner: StaticDirectory,
        searches: AtomicUsize,
    }

    impl CountingDirectory {
        fn new(ids: &[i64]) -> Arc<Self> {
            Arc::new(CountingDirectory {
                inner: StaticDirectory::new(ids.iter().map(|&id| {
                    ResolvedBox::new(BoxId::new(id), format!("10.0.0.{}", id), format!("box-{}", id))
                })),
                searches: AtomicUsize::new(0),
            })
        }

        fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BoxDirectory for CountingDirectory {
        async fn search(&self, ids: &[BoxId]) -> DeliveryResult<Vec<ResolvedBox>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.search(ids).await
        }
    }

    fn build(
        directory: Arc<dyn BoxDirectory>,
        transports: Vec<Arc<Scripted>>,
        config: OrchestratorConfig,
    ) -> DeliveryOrchestrator {
        let transports = transports
            .into_iter()
            .map(|t| t as Arc<dyn Transport>)
            .collect();
        DeliveryOrchestrator::new(ConnectionCache::new(directory), transports, config)
    }

    fn orchestrator(transports: Vec<Arc<Scripted>>) -> DeliveryOrchestrator {
        let directory = StaticDirectory::new([ResolvedBox::new(BoxId::new(1), "10.0.0.1", "box-one")]);
        build(Arc::new(directory), transports, OrchestratorConfig::default())
    }

    // =========================================================================
    // Fallback
    // =========================================================================

    #[tokio::test]
    async fn test_webrtc_success_short_circuits() {
        let webrtc = Scripted::succeeding(TransportKind::WebRtc);
        let longpolling = Scripted::succeeding(TransportKind::LongPolling);
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![
            websocket.clone(),
            longpolling.clone(),
            webrtc.clone(),
        ]);

        let report = orchestrator
            .action(1i64, "printer", json!({"x": 1}))
            .await
            .unwrap();

        assert_eq!(report.transport, TransportKind::WebRtc);
        assert_eq!(webrtc.sends(), 1);
        assert_eq!(longpolling.sends(), 0);
        assert_eq!(websocket.sends(), 0);
        assert_eq!(orchestrator.status().await, ConnectionStatus::WebRtc);
    }

    #[tokio::test]
    async fn test_falls_through_in_priority_order_then_offline() {
        let webrtc = Scripted::failing(TransportKind::WebRtc);
        let longpolling = Scripted::failing(TransportKind::LongPolling);
        let websocket = Scripted::failing(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![
            webrtc.clone(),
            longpolling.clone(),
            websocket.clone(),
        ]);
        assert_eq!(
            orchestrator.transport_order(),
            TransportKind::PRIORITY.to_vec()
        );

        let err = orchestrator
            .action(1i64, "printer", json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Offline { box_id } if box_id == BoxId::new(1)));
        assert_eq!(webrtc.sends(), 1);
        assert_eq!(longpolling.sends(), 1);
        assert_eq!(websocket.sends(), 1);
        assert_eq!(orchestrator.status().await, ConnectionStatus::Offline);
    }

    #[tokio::test]
    async fn test_websocket_used_when_peers_fail() {
        let longpolling = Scripted::failing(TransportKind::LongPolling);
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![
            Scripted::failing(TransportKind::WebRtc),
            longpolling.clone(),
            websocket.clone(),
        ]);

        let report = orchestrator.action(1i64, "printer", json!({})).await.unwrap();
        assert_eq!(report.transport, TransportKind::WebSocket);
        assert_eq!(orchestrator.status().await, ConnectionStatus::WebSocket);
    }

    #[tokio::test]
    async fn test_device_failure_is_terminal() {
        let webrtc = Scripted::new(
            TransportKind::WebRtc,
            true,
            Reply::Failure(json!({"status": "error", "message": "out of paper"})),
        );
        let longpolling = Scripted::succeeding(TransportKind::LongPolling);
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![
            webrtc.clone(),
            longpolling.clone(),
            websocket.clone(),
        ]);

        let err = orchestrator
            .action(1i64, "printer", json!({}))
            .await
            .unwrap_err();

        assert!(err.is_terminal());
        assert_eq!(
            err.device_response().unwrap()["message"],
            "out of paper"
        );
        assert_eq!(longpolling.sends(), 0);
        assert_eq!(websocket.sends(), 0);
        assert_eq!(orchestrator.status().await, ConnectionStatus::WebRtc);
    }

    #[tokio::test]
    async fn test_transport_timeout_is_terminal_and_cancels() {
        let webrtc = Scripted::new(TransportKind::WebRtc, true, Reply::TimedOut);
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![webrtc.clone(), websocket.clone()]);

        let err = orchestrator
            .action_with_id(1i64, "printer", json!({}), ActionId::from("keep-me"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::ReplyTimeout { transport: TransportKind::WebRtc, ref action_id }
                if action_id == "keep-me"
        ));
        assert_eq!(webrtc.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(websocket.sends(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_orchestrator_timeout_by_default() {
        assert_eq!(OrchestratorConfig::default().delivery_timeout, None);

        let webrtc = Scripted::new(TransportKind::WebRtc, true, Reply::Hang);
        let orchestrator = orchestrator(vec![webrtc.clone()]);

        // the wait lasts as long as the transport's own
        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            orchestrator.action(1i64, "printer", json!({})),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(webrtc.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_delivery_timeout_bounds_the_wait() {
        let webrtc = Scripted::new(TransportKind::WebRtc, true, Reply::Hang);
        let directory = StaticDirectory::new([ResolvedBox::new(BoxId::new(1), "10.0.0.1", "box-one")]);
        let orchestrator = build(
            Arc::new(directory),
            vec![webrtc.clone()],
            OrchestratorConfig {
                delivery_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        );

        let err = orchestrator
            .action(1i64, "printer", json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::ReplyTimeout { .. }));
        assert_eq!(webrtc.cancels.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // Long-polling suppression
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_recent_longpolling_failure_is_skipped() {
        let longpolling = Scripted::failing(TransportKind::LongPolling);
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![longpolling.clone(), websocket.clone()]);

        orchestrator.action(1i64, "printer", json!({})).await.unwrap();
        assert_eq!(longpolling.sends(), 1);
        assert!(orchestrator.longpolling_suppressed().await);

        orchestrator.action(1i64, "printer", json!({})).await.unwrap();
        assert_eq!(longpolling.sends(), 1);
        assert_eq!(websocket.sends(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!orchestrator.longpolling_suppressed().await);

        orchestrator.action(1i64, "printer", json!({})).await.unwrap();
        assert_eq!(longpolling.sends(), 2);
    }

    // =========================================================================
    // Cache behavior
    // =========================================================================

    #[tokio::test]
    async fn test_cache_kept_on_success_evicted_on_offline() {
        let ok = orchestrator(vec![Scripted::succeeding(TransportKind::WebSocket)]);
        ok.action(1i64, "printer", json!({})).await.unwrap();
        assert!(ok.cache().cached(BoxId::new(1)).await.is_some());

        let down = orchestrator(vec![Scripted::failing(TransportKind::WebSocket)]);
        down.action(1i64, "printer", json!({})).await.unwrap_err();
        assert!(down.cache().cached(BoxId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_box_evicted_other_box_kept() {
        let directory = CountingDirectory::new(&[1, 2]);
        let orchestrator = build(
            directory.clone(),
            vec![
                Scripted::unreachable_box(TransportKind::LongPolling, BoxId::new(2)),
                Scripted::unreachable_box(TransportKind::WebSocket, BoxId::new(2)),
            ],
            OrchestratorConfig::default(),
        );

        orchestrator.action(1i64, "printer", json!({})).await.unwrap();
        let err = orchestrator
            .action(2i64, "printer", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Offline { box_id } if box_id == BoxId::new(2)));

        let cache = orchestrator.cache();
        assert!(cache.cached(BoxId::new(1)).await.is_some());
        assert!(cache.cached(BoxId::new(2)).await.is_none());
        assert_eq!(directory.searches(), 2);

        // box 1 is served from the cache, box 2 is looked up again
        orchestrator.action(1i64, "printer", json!({})).await.unwrap();
        assert_eq!(directory.searches(), 2);
        orchestrator.action(2i64, "printer", json!({})).await.unwrap_err();
        assert_eq!(directory.searches(), 3);
    }

    #[tokio::test]
    async fn test_wrapped_and_bare_ids_are_equivalent() {
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![websocket.clone()]);

        let wrapped = orchestrator.action([1i64], "printer", json!({})).await.unwrap();
        let bare = orchestrator.action(1i64, "printer", json!({})).await.unwrap();

        assert_eq!(wrapped.box_id, bare.box_id);
        assert_eq!(wrapped.transport, bare.transport);
        assert_eq!(orchestrator.cache().len().await, 1);
    }

    // =========================================================================
    // Request validation
    // =========================================================================

    #[tokio::test]
    async fn test_invalid_requests_touch_no_transport() {
        let websocket = Scripted::succeeding(TransportKind::WebSocket);
        let orchestrator = orchestrator(vec![websocket.clone()]);

        assert!(matches!(
            orchestrator.action(1i64, "", json!({})).await,
            Err(DeliveryError::InvalidRequest(_))
        ));
        assert!(matches!(
            orchestrator.action(99i64, "printer", json!({})).await,
            Err(DeliveryError::BoxNotFound(_))
        ));
        assert_eq!(websocket.sends(), 0);
        assert_eq!(orchestrator.status().await, ConnectionStatus::Unknown);
    }

    #[test]
    fn test_duplicate_transports_are_ignored() {
        let orchestrator = orchestrator(vec![
            Scripted::succeeding(TransportKind::WebSocket),
            Scripted::failing(TransportKind::WebSocket),
        ]);
        assert_eq!(orchestrator.transport_order(), vec![TransportKind::WebSocket]);
    }
}
