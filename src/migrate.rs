//! Schema creation. Every statement is idempotent.

use prompt_studio_core::{Result, StudioError};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        document_type TEXT NOT NULL,
        file_path TEXT NOT NULL,
        chunk_count INTEGER NOT NULL DEFAULT 0,
        content_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        metadata_json TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    // Row order is the index position; `position` is dense from 0.
    r#"
    CREATE TABLE IF NOT EXISTS index_entries (
        position INTEGER PRIMARY KEY,
        chunk_id TEXT NOT NULL UNIQUE,
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        vector BLOB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_index_entries_document ON index_entries(document_id)",
    r#"
    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(StudioError::storage)?;
    }
    tracing::debug!(statements = SCHEMA.len(), "schema up to date");
    Ok(())
}
