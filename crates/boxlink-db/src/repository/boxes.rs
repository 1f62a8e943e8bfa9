//! # IoT Box Repository
//!
//! Directory of boxes this terminal can reach, used by the connection cache
//! on a cache miss.

use boxlink_core::validation::{validate_identity, validate_network_address};
use boxlink_core::{BoxId, ResolvedBox};
use chrono::Utc;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct BoxRow {
    id: i64,
    network_address: String,
    identity: String,
}

impl From<BoxRow> for ResolvedBox {
    fn from(row: BoxRow) -> Self {
        ResolvedBox::new(BoxId::new(row.id), row.network_address, row.identity)
    }
}

/// Repository for the `iot_boxes` table.
#[derive(Debug, Clone)]
pub struct BoxRepository {
    pool: SqlitePool,
}

impl BoxRepository {
    /// Creates a new BoxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BoxRepository { pool }
    }

    /// Inserts or updates a box.
    ///
    /// A box that moved to a new address keeps its id; only the address and
    /// identity columns change.
    pub async fn upsert(&self, resolved: &ResolvedBox, name: &str) -> DbResult<()> {
        validate_network_address(&resolved.network_address)?;
        validate_identity(&resolved.identity)?;

        debug!(
            box_id = %resolved.id,
            address = %resolved.network_address,
            "Upserting IoT box"
        );

        sqlx::query(
            r#"
            INSERT INTO iot_boxes (id, name, network_address, identity, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                network_address = excluded.network_address,
                identity = excluded.identity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(resolved.id.get())
        .bind(name)
        .bind(&resolved.network_address)
        .bind(&resolved.identity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the boxes matching `ids`, in id order. Unknown ids are skipped.
    pub async fn search(&self, ids: &[BoxId]) -> DbResult<Vec<ResolvedBox>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, network_address, identity FROM iot_boxes WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.get());
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows: Vec<BoxRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(ResolvedBox::from).collect())
    }

    /// Returns one box or `DbError::NotFound`.
    pub async fn get(&self, id: BoxId) -> DbResult<ResolvedBox> {
        self.search(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("IoT box", id.to_string()))
    }

    /// Deletes a box. Returns true if it existed.
    pub async fn delete(&self, id: BoxId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM iot_boxes WHERE id = ?1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
