//! # Box Directory
//!
//! Where the connection cache looks boxes up on a miss.
//!
//! Two sources exist: the `[[boxes]]` table of the config file
//! ([`StaticDirectory`]) and the SQLite box table ([`Database`]).

use async_trait::async_trait;
use boxlink_core::{BoxId, ResolvedBox};
use boxlink_db::Database;
use std::collections::HashMap;

use crate::error::DeliveryResult;

/// Lookup of box records by id.
#[async_trait]
pub trait BoxDirectory: Send + Sync {
    /// Returns the records matching `ids`. Unknown ids are omitted.
    async fn search(&self, ids: &[BoxId]) -> DeliveryResult<Vec<ResolvedBox>>;
}

/// In-memory directory built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    boxes: HashMap<BoxId, ResolvedBox>,
}

impl StaticDirectory {
    /// Creates a directory holding `boxes`. Later duplicates win.
    pub fn new(boxes: impl IntoIterator<Item = ResolvedBox>) -> Self {
        StaticDirectory {
            boxes: boxes.into_iter().map(|b| (b.id, b)).collect(),
        }
    }

    /// Number of known boxes.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True if no box is known.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[async_trait]
impl BoxDirectory for StaticDirectory {
    async fn search(&self, ids: &[BoxId]) -> DeliveryResult<Vec<ResolvedBox>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.boxes.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl BoxDirectory for Database {
    async fn search(&self, ids: &[BoxId]) -> DeliveryResult<Vec<ResolvedBox>> {
        Ok(self.boxes().search(ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxlink_db::DbConfig;

    #[tokio::test]
    async fn test_static_directory_skips_unknown_ids() {
        let directory = StaticDirectory::new([
            ResolvedBox::new(BoxId::new(1), "10.0.0.1", "box-one"),
            ResolvedBox::new(BoxId::new(2), "10.0.0.2", "box-two"),
        ]);

        let found = directory
            .search(&[BoxId::new(2), BoxId::new(3)])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identity, "box-two");
    }

    #[tokio::test]
    async fn test_database_directory() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.boxes()
            .upsert(&ResolvedBox::new(BoxId::new(9), "10.0.0.9", "box-nine"), "Bar")
            .await
            .unwrap();

        let found = BoxDirectory::search(&db, &[BoxId::new(9)]).await.unwrap();
        assert_eq!(found[0].network_address, "10.0.0.9");
    }
}
