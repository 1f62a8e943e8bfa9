//! # Blackbox Queue
//!
//! Batches fiscal requests for the blackbox and delivers them in FIFO order.
//!
//! ## Flush Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      BlackboxQueue                                      │
//! │                                                                         │
//! │  enqueue(item) ──► items.push ──► persist ──┬─ force ──► flush() now   │
//! │                                             └─ else  ──► (re)arm timer │
//! │                                                            │ debounce  │
//! │                                                            ▼           │
//! │  flush()   [one at a time: flush_lock]                                 │
//! │  ──────                                                                │
//! │  1. empty or waiting for next request?  ──► Ok([])                     │
//! │  2. copy items into batch; they stay queued and persisted              │
//! │  3. sender.send_batch(batch)  (one call, whole batch)                  │
//! │  4. per response, in order:                                            │
//! │       code empty / recoverable ──► handler(callback_name)(resp, args)  │
//! │       other code               ──► QueueError::Device                  │
//! │  5. settle: remove the batch from the front, persist                   │
//! │     on failure with a non-recoverable code:                            │
//! │       keep unprocessed items in front (stop at first force item)       │
//! │       wait for next request                                            │
//! │                                                                         │
//! │  STORAGE KEY: pos_bb_queue_<session token>                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue is a cheap handle; clones share the same backlog.
//!
//! A batch leaves the backlog only once its outcome is known. A flush that
//! is dropped mid-send leaves every item in place, so the next flush sends
//! them again.

use async_trait::async_trait;
use boxlink_core::codes::ResponseClass;
use boxlink_core::validation::validate_session_token;
use boxlink_core::{
    decode_queue, encode_queue, queue_storage_key, BoxRef, QueueItem, RecoverableCodes,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DeliveryConfig;
use crate::error::{BatchFailure, DeliveryError, DeliveryResult, QueueError, QueueResult};
use crate::orchestrator::DeliveryOrchestrator;
use crate::storage::KvStore;

// =============================================================================
// Seams
// =============================================================================

/// Sends a whole batch to the blackbox.
#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Returns one response per item, index-aligned with `batch`.
    async fn send_batch(&self, batch: &[QueueItem]) -> Result<Vec<Value>, BatchFailure>;
}

/// Handles the blackbox response to one item.
pub trait ResponseHandler: Send + Sync {
    /// Receives the response and the item's `args`.
    fn handle(&self, response: Value, args: &[Value]) -> QueueResult<Value>;
}

impl<F> ResponseHandler for F
where
    F: Fn(Value, &[Value]) -> QueueResult<Value> + Send + Sync,
{
    fn handle(&self, response: Value, args: &[Value]) -> QueueResult<Value> {
        self(response, args)
    }
}

/// Handler used when an item names no callback: returns the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHandler;

impl ResponseHandler for IdentityHandler {
    fn handle(&self, response: Value, _args: &[Value]) -> QueueResult<Value> {
        Ok(response)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Quiet period before a debounced flush.
    pub debounce: Duration,

    /// Code prefixes that do not fail a flush.
    pub recoverable_codes: RecoverableCodes,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            debounce: Duration::from_secs(1),
            recoverable_codes: RecoverableCodes::default(),
        }
    }
}

impl From<&DeliveryConfig> for QueueConfig {
    fn from(config: &DeliveryConfig) -> Self {
        QueueConfig {
            debounce: config.queue.debounce(),
            recoverable_codes: config.queue.recoverable_codes.clone(),
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<QueueItem>,
    waiting_for_next_request: bool,
    /// Bumped by `clear_queue`; an in-flight batch from an older epoch is gone.
    epoch: u64,
}

struct DebounceTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct QueueInner {
    key: String,
    store: Arc<dyn KvStore>,
    sender: Arc<dyn BatchSender>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    flush_lock: Mutex<()>,
    handlers: RwLock<HashMap<String, Arc<dyn ResponseHandler>>>,
    timer: Mutex<Option<DebounceTimer>>,
    generation: AtomicU64,
}

/// Durable, debounced, single-flight queue in front of the blackbox.
///
/// ## Usage
/// ```rust,ignore
/// let queue = BlackboxQueue::open(store, &config.session.token, sender, QueueConfig::from(&config)).await?;
/// queue.register_handler("store_signature", |response, args| { ... }).await;
///
/// queue.enqueue(QueueItem::new(receipt, "registerReceipt").callback("store_signature")).await?;
/// ```
#[derive(Clone)]
pub struct BlackboxQueue {
    inner: Arc<QueueInner>,
}

impl BlackboxQueue {
    /// Opens the queue for a session, reloading any persisted backlog.
    pub async fn open(
        store: Arc<dyn KvStore>,
        session_token: &str,
        sender: Arc<dyn BatchSender>,
        config: QueueConfig,
    ) -> QueueResult<Self> {
        validate_session_token(session_token)?;
        let key = queue_storage_key(session_token);

        let items = match store.get(&key).await? {
            Some(raw) => decode_queue(&raw)?,
            None => Vec::new(),
        };

        if !items.is_empty() {
            info!(pending = items.len(), "Reloaded blackbox backlog");
        }

        Ok(BlackboxQueue {
            inner: Arc::new(QueueInner {
                key,
                store,
                sender,
                config,
                state: Mutex::new(QueueState {
                    items,
                    waiting_for_next_request: false,
                    epoch: 0,
                }),
                flush_lock: Mutex::new(()),
                handlers: RwLock::new(HashMap::new()),
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Registers the handler for items whose `callback_name` is `name`.
    pub async fn register_handler<H>(&self, name: impl Into<String>, handler: H)
    where
        H: ResponseHandler + 'static,
    {
        self.inner
            .handlers
            .write()
            .await
            .insert(name.into(), Arc::new(handler));
    }

    /// Appends an item.
    ///
    /// A `force` item flushes right away and returns the handler results;
    /// any other item arms the debounce timer and returns nothing.
    pub async fn enqueue(&self, item: QueueItem) -> QueueResult<Vec<Value>> {
        let force = item.force;

        {
            let mut state = self.inner.state.lock().await;
            state.items.push(item);
            if let Err(e) = self.persist(&state.items).await {
                state.items.pop();
                return Err(e);
            }
            state.waiting_for_next_request = false;
            debug!(pending = state.items.len(), force, "Blackbox request queued");
        }

        if force {
            self.cancel_debounce().await;
            self.flush().await
        } else {
            self.schedule_flush().await;
            Ok(Vec::new())
        }
    }

    /// Sends everything queued as one batch.
    ///
    /// Concurrent calls run one after the other; the later ones usually find
    /// the queue empty. Items stay queued while the batch is in flight.
    pub async fn flush(&self) -> QueueResult<Vec<Value>> {
        let _flushing = self.inner.flush_lock.lock().await;

        let (batch, epoch) = {
            let state = self.inner.state.lock().await;
            if state.items.is_empty() {
                return Ok(Vec::new());
            }
            if state.waiting_for_next_request {
                debug!(pending = state.items.len(), "Flush held until next request");
                return Ok(Vec::new());
            }
            (state.items.clone(), state.epoch)
        };

        info!(count = batch.len(), "Flushing blackbox batch");

        let mut processed = 0;
        match self.send_and_dispatch(&batch, &mut processed).await {
            Ok(results) => {
                debug!(count = results.len(), "Blackbox batch done");
                self.settle(epoch, batch.len(), None).await;
                Ok(results)
            }
            Err(err) if err.is_recoverable(&self.inner.config.recoverable_codes) => {
                warn!(error = %err, "Blackbox batch failed with a recoverable code");
                self.settle(epoch, batch.len(), None).await;
                Err(err)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    unprocessed = batch.len() - processed,
                    "Blackbox batch failed, re-queueing"
                );
                self.settle(epoch, batch.len(), Some(processed)).await;
                Err(err)
            }
        }
    }

    /// Drops every queued item.
    pub async fn clear_queue(&self) -> QueueResult<()> {
        let mut state = self.inner.state.lock().await;
        state.items.clear();
        state.epoch += 1;
        self.persist(&state.items).await?;
        info!("Blackbox queue cleared");
        Ok(())
    }

    /// Number of queued items.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.items.len()
    }

    /// True if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.inner.state.lock().await.items.is_empty()
    }

    /// Snapshot of the queued items in send order.
    pub async fn pending(&self) -> Vec<QueueItem> {
        self.inner.state.lock().await.items.clone()
    }

    /// True if flushes are held until the next `enqueue`.
    pub async fn is_waiting_for_next_request(&self) -> bool {
        self.inner.state.lock().await.waiting_for_next_request
    }

    /// Storage key of this queue.
    pub fn storage_key(&self) -> &str {
        &self.inner.key
    }

    /// Cancels a pending debounced flush. The backlog stays persisted.
    pub async fn shutdown(&self) {
        self.cancel_debounce().await;
        debug!("Blackbox queue shut down");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn persist(&self, items: &[QueueItem]) -> QueueResult<()> {
        let raw = encode_queue(items)?;
        self.inner.store.set(&self.inner.key, &raw).await
    }

    async fn send_and_dispatch(
        &self,
        batch: &[QueueItem],
        processed: &mut usize,
    ) -> QueueResult<Vec<Value>> {
        let responses = self.inner.sender.send_batch(batch).await?;
        let answered = responses.len();

        let mut results = Vec::with_capacity(batch.len());
        for (item, response) in batch.iter().zip(responses) {
            *processed += 1;

            if let ResponseClass::Rejected { code, message } =
                self.inner.config.recoverable_codes.classify(&response)
            {
                return Err(QueueError::Device { code, message });
            }

            let handler = self.handler_for(item.callback_name.as_deref()).await?;
            results.push(handler.handle(response, &item.args)?);
        }

        if answered < batch.len() {
            return Err(QueueError::Batch(BatchFailure::new(format!(
                "blackbox answered {} of {} requests",
                answered,
                batch.len()
            ))));
        }

        Ok(results)
    }

    async fn handler_for(&self, name: Option<&str>) -> QueueResult<Arc<dyn ResponseHandler>> {
        let Some(name) = name else {
            return Ok(Arc::new(IdentityHandler));
        };

        self.inner
            .handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::Handler {
                name: name.to_string(),
                reason: "not registered".to_string(),
            })
    }

    /// Removes a finished batch from the front of the backlog.
    ///
    /// With `failed_at`, the items from that index on stay in front of
    /// anything queued meanwhile, up to the first force item, and flushing
    /// waits for the next request.
    async fn settle(&self, epoch: u64, sent: usize, failed_at: Option<usize>) {
        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            debug!("Queue cleared while the batch was in flight");
            return;
        }

        let sent = sent.min(state.items.len());
        let mut done: Vec<QueueItem> = state.items.drain(..sent).collect();

        if let Some(processed) = failed_at {
            let mut restored = Vec::with_capacity(done.len().saturating_sub(processed));
            for item in done.drain(processed.min(done.len())..) {
                if item.force {
                    warn!(action = %item.action, "Dropping forced request after batch failure");
                    break;
                }
                restored.push(item);
            }

            let newer = std::mem::take(&mut state.items);
            state.items = restored;
            state.items.extend(newer);
            state.waiting_for_next_request = true;
        }

        if let Err(e) = self.persist(&state.items).await {
            error!(error = %e, "Failed to persist blackbox backlog");
        }
    }

    async fn schedule_flush(&self) {
        let mut timer = self.inner.timer.lock().await;
        if let Some(previous) = timer.take() {
            previous.handle.abort();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.inner.config.debounce;
        let queue = self.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !queue.claim_timer(generation).await {
                return;
            }
            if let Err(e) = queue.flush().await {
                warn!(error = %e, "Debounced blackbox flush failed");
            }
        });

        *timer = Some(DebounceTimer { generation, handle });
    }

    /// Removes the timer slot if it still belongs to `generation`. After
    /// this nobody can abort the running flush.
    async fn claim_timer(&self, generation: u64) -> bool {
        let mut timer = self.inner.timer.lock().await;
        match timer.as_ref() {
            Some(current) if current.generation == generation => {
                timer.take();
                true
            }
            _ => false,
        }
    }

    async fn cancel_debounce(&self) {
        if let Some(previous) = self.inner.timer.lock().await.take() {
            previous.handle.abort();
        }
    }
}

// =============================================================================
// Orchestrator Batch Sender
// =============================================================================

/// Delivers batches to the blackbox device through the orchestrator.
///
/// The batch goes out as one action:
/// ```text
/// {"action": "batch", "requests": [{"action": "...", "data": {...}}, ...]}
/// ```
/// and the box answers with `{"responses": [...]}`, one per request.
pub struct OrchestratorBatchSender {
    orchestrator: Arc<DeliveryOrchestrator>,
    target: BoxRef,
    device_id: String,
}

impl OrchestratorBatchSender {
    /// Creates a sender for the blackbox `device_id` on box `target`.
    pub fn new(
        orchestrator: Arc<DeliveryOrchestrator>,
        target: impl Into<BoxRef>,
        device_id: impl Into<String>,
    ) -> Self {
        OrchestratorBatchSender {
            orchestrator,
            target: target.into(),
            device_id: device_id.into(),
        }
    }

    /// Creates a sender for the blackbox named in `[queue]`.
    pub fn from_config(
        orchestrator: Arc<DeliveryOrchestrator>,
        config: &DeliveryConfig,
    ) -> DeliveryResult<Self> {
        let (box_id, device_id) = config.queue.blackbox_target().ok_or_else(|| {
            DeliveryError::InvalidConfig(
                "queue.blackbox_box and queue.blackbox_device must both be set".into(),
            )
        })?;
        Ok(Self::new(orchestrator, box_id, device_id))
    }

    /// Box the batches go to.
    pub fn target(&self) -> &BoxRef {
        &self.target
    }

    /// Blackbox device id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[async_trait]
impl BatchSender for OrchestratorBatchSender {
    async fn send_batch(&self, batch: &[QueueItem]) -> Result<Vec<Value>, BatchFailure> {
        let requests: Vec<Value> = batch
            .iter()
            .map(|item| json!({"action": item.action, "data": item.request_data}))
            .collect();

        let report = self
            .orchestrator
            .action(
                self.target.clone(),
                &self.device_id,
                json!({"action": "batch", "requests": requests}),
            )
            .await?;

        batch_responses(report.response)
    }
}

/// Extracts the per-request responses from a blackbox batch reply.
fn batch_responses(reply: Value) -> Result<Vec<Value>, BatchFailure> {
    let responses = match reply {
        Value::Array(responses) => return Ok(responses),
        Value::Object(mut map) => map.remove("responses").or_else(|| {
            map.remove("result")
                .and_then(|mut result| result.get_mut("responses").map(Value::take))
        }),
        _ => None,
    };

    match responses {
        Some(Value::Array(responses)) => Ok(responses),
        _ => Err(BatchFailure::new("blackbox reply carries no responses")),
    }
}
