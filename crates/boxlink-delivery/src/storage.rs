//! # Queue Storage
//!
//! Durable string storage for the blackbox backlog.

use async_trait::async_trait;
use boxlink_db::Database;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::QueueResult;

/// Key-value storage the queue persists into.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> QueueResult<Option<String>>;

    /// Writes a value, replacing the previous one.
    async fn set(&self, key: &str, value: &str) -> QueueResult<()>;

    /// Deletes a value.
    async fn remove(&self, key: &str) -> QueueResult<()>;
}

/// Process-local store, for tests and for hosts without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> QueueResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl KvStore for Database {
    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        Ok(self.kv().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
        Ok(self.kv().set(key, value).await?)
    }

    async fn remove(&self, key: &str) -> QueueResult<()> {
        self.kv().remove(key).await?;
        Ok(())
    }
}
