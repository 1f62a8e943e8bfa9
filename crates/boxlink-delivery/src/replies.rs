//! # Reply Routing
//!
//! Matches replies arriving on a shared channel (WebRTC data channel,
//! websocket relay) to the call waiting for them, by action id.
//!
//! ```text
//! send_message ──► register(id) ──► wire
//!                                     │
//!  reader task ◄──────────────────────┘  dispatch(reply) ──► oneshot
//!                                                              │
//! await_reply ──► wait(id) ◄───────────────────────────────────┘
//! ```
//!
//! A slot is registered before the message leaves, so a reply that arrives
//! before `wait()` is called is buffered in the oneshot, not lost.

use boxlink_core::{ActionId, DeviceReply};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::transport::reply_action_id;

#[derive(Default)]
struct Slot {
    tx: Option<oneshot::Sender<Value>>,
    rx: Option<oneshot::Receiver<Value>>,
}

/// Pending replies keyed by action id.
#[derive(Default)]
pub struct ReplyRouter {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ReplyRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a slot for `action_id`. Call before sending.
    pub async fn register(&self, action_id: &ActionId) {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().await;
        if slots
            .insert(
                action_id.as_str().to_string(),
                Slot {
                    tx: Some(tx),
                    rx: Some(rx),
                },
            )
            .is_some()
        {
            warn!(action_id = %action_id, "Replacing pending reply slot");
        }
    }

    /// Delivers an incoming reply. Returns false if nobody waits for it.
    pub async fn dispatch(&self, message: Value) -> bool {
        let Some(id) = reply_action_id(&message).map(str::to_string) else {
            debug!("Dropping reply without action id");
            return false;
        };

        let mut slots = self.slots.lock().await;
        match slots.get_mut(&id).and_then(|slot| slot.tx.take()) {
            Some(tx) => tx.send(message).is_ok(),
            None => {
                debug!(action_id = %id, "Dropping unsolicited reply");
                false
            }
        }
    }

    /// Waits up to `limit` for the reply to `action_id`.
    pub async fn wait(
        &self,
        action_id: &ActionId,
        limit: Duration,
    ) -> TransportResult<DeviceReply> {
        let rx = {
            let mut slots = self.slots.lock().await;
            slots
                .get_mut(action_id.as_str())
                .and_then(|slot| slot.rx.take())
        };

        let Some(rx) = rx else {
            return Err(TransportError::Protocol(format!(
                "no pending reply for action {}",
                action_id
            )));
        };

        let outcome = timeout(limit, rx).await;
        self.slots.lock().await.remove(action_id.as_str());

        match outcome {
            Ok(Ok(message)) => Ok(DeviceReply::from_message(message)),
            Ok(Err(_)) => Err(TransportError::Disconnected(
                "reply channel closed".to_string(),
            )),
            Err(_) => {
                debug!(action_id = %action_id, "No reply within limit");
                Err(TransportError::Timeout(limit.as_millis() as u64))
            }
        }
    }

    /// Drops the slot for `action_id`.
    pub async fn cancel(&self, action_id: &ActionId) {
        self.slots.lock().await.remove(action_id.as_str());
    }

    /// Fails every pending wait, e.g. after the channel dropped.
    pub async fn fail_all(&self) {
        let mut slots = self.slots.lock().await;
        for slot in slots.values_mut() {
            slot.tx.take();
        }
        slots.retain(|_, slot| slot.rx.is_some());
    }

    /// Number of open slots.
    pub async fn pending(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_reply_before_wait_is_buffered() {
        let router = ReplyRouter::new();
        let id = ActionId::from("a-1");

        router.register(&id).await;
        assert!(router.dispatch(json!({"action_id": "a-1", "status": "success"})).await);

        let reply = router.wait(&id, LIMIT).await.unwrap();
        assert!(reply.is_success());
        assert_eq!(router.pending().await, 0);
    }

    #[tokio::test]
    async fn test_failure_status_and_unknown_ids() {
        let router = ReplyRouter::new();
        let id = ActionId::from("a-2");
        router.register(&id).await;

        assert!(!router.dispatch(json!({"action_id": "other"})).await);
        assert!(!router.dispatch(json!({"status": "ok"})).await);

        router
            .dispatch(json!({"action_id": "a-2", "status": "error", "message": "no paper"}))
            .await;
        let reply = router.wait(&id, LIMIT).await.unwrap();
        assert!(!reply.is_success());
    }

    #[tokio::test]
    async fn test_fail_all_wakes_waiters() {
        let router = Arc::new(ReplyRouter::new());
        let id = ActionId::from("a-3");
        router.register(&id).await;

        let waiter = {
            let router = router.clone();
            let id = id.clone();
            tokio::spawn(async move { router.wait(&id, LIMIT).await })
        };
        tokio::task::yield_now().await;

        router.fail_all().await;
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Err(TransportError::Disconnected(_))));
    }

    #[tokio::test]
    async fn test_wait_without_register_is_protocol_error() {
        let router = ReplyRouter::new();
        let outcome = router.wait(&ActionId::from("never"), LIMIT).await;
        assert!(matches!(outcome, Err(TransportError::Protocol(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_limit() {
        let router = ReplyRouter::new();
        let id = ActionId::from("a-4");
        router.register(&id).await;

        let outcome = router.wait(&id, Duration::from_millis(250)).await;
        assert!(matches!(outcome, Err(TransportError::Timeout(250))));
        assert_eq!(router.pending().await, 0);

        // a late reply finds no slot
        assert!(!router.dispatch(json!({"action_id": "a-4", "status": "success"})).await);
    }
}
