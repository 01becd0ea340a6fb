//! Document registry: one row per ingested file.
//!
//! The registry records what was uploaded and where it was stored. Chunk
//! text and vectors live in the vector index; `chunk_count` mirrors how
//! many chunks the index holds for the document.

use chrono::{DateTime, Utc};
use prompt_studio_core::models::{Document, DocumentType};
use prompt_studio_core::{Result, StudioError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub async fn insert(pool: &SqlitePool, doc: &Document, content_hash: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO documents \
         (id, filename, document_type, file_path, chunk_count, content_hash, created_at, metadata_json) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&doc.id)
    .bind(&doc.filename)
    .bind(doc.document_type.as_str())
    .bind(&doc.file_path)
    .bind(doc.chunk_count as i64)
    .bind(content_hash)
    .bind(doc.created_at.to_rfc3339())
    .bind(doc.metadata.to_string())
    .execute(pool)
    .await
    .map_err(StudioError::storage)?;
    Ok(())
}

/// All documents, oldest first.
pub async fn list(pool: &SqlitePool) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT id, filename, document_type, file_path, chunk_count, created_at, metadata_json \
         FROM documents ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await
    .map_err(StudioError::storage)?;

    rows.iter().map(row_to_document).collect()
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Document> {
    let row = sqlx::query(
        "SELECT id, filename, document_type, file_path, chunk_count, created_at, metadata_json \
         FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(StudioError::storage)?
    .ok_or_else(|| StudioError::NotFound(format!("document {}", id)))?;

    row_to_document(&row)
}

/// Id of an already-registered document with the same content, if any.
pub async fn find_by_hash(pool: &SqlitePool, content_hash: &str) -> Result<Option<String>> {
    sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ? LIMIT 1")
        .bind(content_hash)
        .fetch_optional(pool)
        .await
        .map_err(StudioError::storage)
}

/// Remove a document row. Returns whether a row existed.
pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(StudioError::storage)?;
    Ok(result.rows_affected() > 0)
}

/// Remove every document row. Returns how many were removed.
pub async fn clear(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM documents")
        .execute(pool)
        .await
        .map_err(StudioError::storage)?;
    Ok(result.rows_affected())
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let document_type: String = row.get("document_type");
    let chunk_count: i64 = row.get("chunk_count");
    let created_at: String = row.get("created_at");
    let metadata_json: String = row.get("metadata_json");

    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        document_type: DocumentType::from_extension(&document_type).ok_or_else(|| {
            StudioError::Storage(format!("unknown stored document type '{}'", document_type))
        })?,
        file_path: row.get("file_path"),
        chunk_count: chunk_count as usize,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(StudioError::storage)?
            .with_timezone(&Utc),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_else(|_| serde_json::json!({})),
    })
}
