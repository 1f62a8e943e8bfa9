//! # Key-Value Repository
//!
//! Durable string storage keyed by name.
//!
//! The blackbox queue writes its whole backlog here on every change, under
//! `pos_bb_queue_<session token>`:
//! ```text
//! enqueue(item) ──► encode_queue(all items) ──► kv.set(key, json)
//! restart       ──► kv.get(key) ──► decode_queue(json) ──► same FIFO order
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for the `kv_store` table.
#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
}

impl KvRepository {
    /// Creates a new KvRepository.
    pub fn new(pool: SqlitePool) -> Self {
        KvRepository { pool }
    }

    /// Returns the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, bytes = value.len(), "Writing kv entry");

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes `key`. Returns true if something was deleted.
    pub async fn remove(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists keys starting with `prefix`, sorted.
    ///
    /// Used to find backlogs left behind by earlier sessions.
    pub async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));

        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM kv_store WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key ASC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_set_get_overwrite_remove() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kv = db.kv();

        assert_eq!(kv.get("pos_bb_queue_a").await.unwrap(), None);

        kv.set("pos_bb_queue_a", "[]").await.unwrap();
        kv.set("pos_bb_queue_a", "[1]").await.unwrap();
        assert_eq!(kv.get("pos_bb_queue_a").await.unwrap().as_deref(), Some("[1]"));

        assert!(kv.remove("pos_bb_queue_a").await.unwrap());
        assert!(!kv.remove("pos_bb_queue_a").await.unwrap());
        assert_eq!(kv.get("pos_bb_queue_a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_with_prefix_escapes_wildcards() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kv = db.kv();

        kv.set("pos_bb_queue_s1", "[]").await.unwrap();
        kv.set("pos_bb_queue_s2", "[]").await.unwrap();
        // `_` must not act as a single-character wildcard
        kv.set("posXbbXqueueXs3", "[]").await.unwrap();

        let keys = kv.keys_with_prefix("pos_bb_queue_").await.unwrap();
        assert_eq!(keys, vec!["pos_bb_queue_s1", "pos_bb_queue_s2"]);
    }
}
