//! # Connection Cache
//!
//! Remembers resolved boxes so repeated actions skip the directory.
//!
//! ```text
//! resolve(BoxRef) ──► normalize ──► hit? ──yes──► cached ResolvedBox
//!                                     │
//!                                     no ──► directory.search([id]) ──► store
//!
//! every transport failed ──► invalidate(id)   (next call looks it up again)
//! ```
//!
//! Entries never expire on their own; only a fully failed delivery evicts.

use boxlink_core::{BoxId, BoxRef, ResolvedBox};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::directory::BoxDirectory;
use crate::error::{DeliveryError, DeliveryResult};

/// Cache of resolved boxes in front of a [`BoxDirectory`].
pub struct ConnectionCache {
    directory: Arc<dyn BoxDirectory>,
    entries: RwLock<HashMap<BoxId, ResolvedBox>>,
}

impl ConnectionCache {
    /// Creates an empty cache.
    pub fn new(directory: Arc<dyn BoxDirectory>) -> Self {
        ConnectionCache {
            directory,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves a box reference, going to the directory on a miss.
    pub async fn resolve(&self, target: &BoxRef) -> DeliveryResult<ResolvedBox> {
        let id = target.normalize()?;
        self.resolve_id(id).await
    }

    /// Resolves a normalized box id.
    pub async fn resolve_id(&self, id: BoxId) -> DeliveryResult<ResolvedBox> {
        if let Some(hit) = self.entries.read().await.get(&id) {
            return Ok(hit.clone());
        }

        debug!(box_id = %id, "Connection cache miss");

        let resolved = self
            .directory
            .search(&[id])
            .await?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or(DeliveryError::BoxNotFound(id))?;

        self.entries.write().await.insert(id, resolved.clone());
        Ok(resolved)
    }

    /// Evicts a box. Returns the evicted entry.
    pub async fn invalidate(&self, id: BoxId) -> Option<ResolvedBox> {
        let evicted = self.entries.write().await.remove(&id);
        if evicted.is_some() {
            debug!(box_id = %id, "Evicted from connection cache");
        }
        evicted
    }

    /// Returns the cached entry without touching the directory.
    pub async fn cached(&self, id: BoxId) -> Option<ResolvedBox> {
        self.entries.read().await.get(&id).cloned()
    }

    /// Number of cached boxes.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
