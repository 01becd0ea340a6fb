//! SQLite-backed [`IndexPersistence`].
//!
//! A snapshot is stored as one row per index entry in `index_entries`
//! (vector as a little-endian `f32` blob) plus the dimension in
//! `index_meta`. Each save deletes and rewrites both tables inside a
//! single transaction, so a crash mid-save leaves the previous snapshot.

use async_trait::async_trait;
use prompt_studio_core::embedding::{blob_to_vec, vec_to_blob};
use prompt_studio_core::index::{IndexEntry, IndexPersistence, IndexSnapshot};
use prompt_studio_core::{Result, StudioError};
use sqlx::{Row, SqlitePool};

const DIMENSION_KEY: &str = "dimension";

pub struct SqliteIndexPersistence {
    pool: SqlitePool,
}

impl SqliteIndexPersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndexPersistence for SqliteIndexPersistence {
    async fn load(&self) -> Result<Option<IndexSnapshot>> {
        let dimension: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(DIMENSION_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(StudioError::storage)?;

        let rows = sqlx::query(
            "SELECT position, chunk_id, document_id, chunk_index, content, metadata_json, vector \
             FROM index_entries ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StudioError::storage)?;

        let Some(dimension) = dimension else {
            if rows.is_empty() {
                return Ok(None);
            }
            return Err(StudioError::Storage(
                "index entries present but dimension metadata is missing".into(),
            ));
        };
        let dimension: usize = dimension
            .parse()
            .map_err(|e| StudioError::Storage(format!("bad index dimension '{}': {}", dimension, e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let position: i64 = row.get("position");
            let chunk_index: i64 = row.get("chunk_index");
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("vector");

            entries.push(IndexEntry {
                position: position as usize,
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                chunk_index: chunk_index as usize,
                content: row.get("content"),
                metadata: serde_json::from_str(&metadata_json).map_err(StudioError::storage)?,
            });
            vectors.push(blob_to_vec(&blob));
        }

        Ok(Some(IndexSnapshot {
            dimension,
            entries,
            vectors,
        }))
    }

    async fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(StudioError::storage)?;

        sqlx::query("DELETE FROM index_entries")
            .execute(&mut *tx)
            .await
            .map_err(StudioError::storage)?;

        for (entry, vector) in snapshot.entries.iter().zip(&snapshot.vectors) {
            sqlx::query(
                "INSERT INTO index_entries \
                 (position, chunk_id, document_id, chunk_index, content, metadata_json, vector) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.position as i64)
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(entry.chunk_index as i64)
            .bind(&entry.content)
            .bind(entry.metadata.to_string())
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(StudioError::storage)?;
        }

        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(DIMENSION_KEY)
        .bind(snapshot.dimension.to_string())
        .execute(&mut *tx)
        .await
        .map_err(StudioError::storage)?;

        tx.commit().await.map_err(StudioError::storage)?;
        tracing::debug!(entries = snapshot.entries.len(), "index snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use serde_json::json;
    use tempfile::TempDir;

    async fn pool(tmp: &TempDir) -> SqlitePool {
        let mut config = Config::default();
        config.store.path = tmp.path().join("data/studio.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn entry(position: usize, chunk_id: &str) -> IndexEntry {
        IndexEntry {
            position,
            chunk_id: chunk_id.into(),
            document_id: "doc".into(),
            chunk_index: position,
            content: format!("content {}", position),
            metadata: json!({"char_count": 9}),
        }
    }

    #[tokio::test]
    async fn empty_store_loads_none() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexPersistence::new(pool(&tmp).await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_order_and_vectors() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexPersistence::new(pool(&tmp).await);
        let snapshot = IndexSnapshot {
            dimension: 2,
            entries: vec![entry(0, "doc_chunk_0"), entry(1, "doc_chunk_1")],
            vectors: vec![vec![1.0, 0.0], vec![0.6, 0.8]],
        };
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexPersistence::new(pool(&tmp).await);
        store
            .save(&IndexSnapshot {
                dimension: 2,
                entries: vec![entry(0, "a"), entry(1, "b")],
                vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            })
            .await
            .unwrap();
        store
            .save(&IndexSnapshot {
                dimension: 2,
                entries: vec![entry(0, "b")],
                vectors: vec![vec![0.0, 1.0]],
            })
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].chunk_id, "b");
    }

    #[tokio::test]
    async fn cleared_snapshot_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteIndexPersistence::new(pool(&tmp).await);
        store
            .save(&IndexSnapshot {
                dimension: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.entries.is_empty());
        assert_eq!(loaded.dimension, 3);
    }
}
