//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Every entry is one row of `index_entries` keyed by `(collection, id)`,
//! with the attribute map stored as JSON text and the vector as a
//! little-endian f32 BLOB. Attribute filters and cosine distance are
//! evaluated in Rust over the rows of the collection: a brute-force scan
//! sized for a personal archive (thousands of chunks, not millions).
//!
//! `conversation_id` is copied out of the attributes into its own indexed
//! column so the per-conversation delete of the re-index protocol is a
//! single statement.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::migrate;
use crate::store::{
    cosine_distance, rank_hits, Attributes, Collection, FetchedEntry, Filter, IndexEntry,
    QueryHit, VectorIndex,
};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

struct StoredEntry {
    id: String,
    attributes: Attributes,
    vector: Vec<f32>,
}

impl SqliteVectorIndex {
    /// Wrap a pool, creating the schema if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        migrate::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load(&self, collection: Collection, with_vectors: bool) -> Result<Vec<StoredEntry>> {
        let sql = if with_vectors {
            "SELECT id, attributes, vector FROM index_entries WHERE collection = ? ORDER BY id"
        } else {
            "SELECT id, attributes, X'' AS vector FROM index_entries WHERE collection = ? ORDER BY id"
        };
        let rows = sqlx::query(sql)
            .bind(collection.name())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let raw: String = row.get("attributes");
                let attributes = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt attributes for index entry {}", id))?;
                let blob: Vec<u8> = row.get("vector");
                Ok(StoredEntry {
                    id,
                    attributes,
                    vector: blob_to_vec(&blob),
                })
            })
            .collect()
    }
}

fn conversation_of(attributes: &Attributes) -> Option<&str> {
    attributes.get("conversation_id").and_then(Value::as_str)
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert(&self, collection: Collection, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let attributes = serde_json::to_string(&entry.attributes)?;
            sqlx::query(
                r#"
                INSERT INTO index_entries (collection, id, conversation_id, attributes, vector)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    conversation_id = excluded.conversation_id,
                    attributes = excluded.attributes,
                    vector = excluded.vector
                "#,
            )
            .bind(collection.name())
            .bind(&entry.id)
            .bind(conversation_of(&entry.attributes))
            .bind(&attributes)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_where(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        if let Filter::Equals {
            field,
            value: Value::String(conversation_id),
        } = filter
        {
            if field == "conversation_id" {
                let result = sqlx::query(
                    "DELETE FROM index_entries WHERE collection = ? AND conversation_id = ?",
                )
                .bind(collection.name())
                .bind(conversation_id)
                .execute(&self.pool)
                .await?;
                return Ok(result.rows_affected() as usize);
            }
        }

        let doomed: Vec<String> = self
            .load(collection, false)
            .await?
            .into_iter()
            .filter(|row| filter.matches(&row.attributes))
            .map(|row| row.id)
            .collect();

        let mut tx = self.pool.begin().await?;
        for id in &doomed {
            sqlx::query("DELETE FROM index_entries WHERE collection = ? AND id = ?")
                .bind(collection.name())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(doomed.len())
    }

    async fn query(
        &self,
        collection: Collection,
        near: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let hits = self
            .load(collection, true)
            .await?
            .into_iter()
            .filter(|row| !row.vector.is_empty())
            .filter(|row| filter.map_or(true, |f| f.matches(&row.attributes)))
            .map(|row| QueryHit {
                distance: cosine_distance(near, &row.vector),
                id: row.id,
                attributes: row.attributes,
            })
            .collect();
        Ok(rank_hits(hits, limit))
    }

    async fn fetch_where(
        &self,
        collection: Collection,
        filter: Option<&Filter>,
        limit: usize,
        include_vector: bool,
    ) -> Result<Vec<FetchedEntry>> {
        Ok(self
            .load(collection, include_vector)
            .await?
            .into_iter()
            .filter(|row| filter.map_or(true, |f| f.matches(&row.attributes)))
            .take(limit)
            .map(|row| FetchedEntry {
                id: row.id,
                attributes: row.attributes,
                vector: include_vector.then_some(row.vector),
            })
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM index_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE collection = ?")
                .bind(collection.name())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}
