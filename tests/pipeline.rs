//! End-to-end tests of the studio service over a temp SQLite store,
//! with stub model providers.

mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use prompt_studio::settings::LlmUpdate;
use prompt_studio_core::models::{
    ChatMessage, ChatPrompt, ChatRole, DocumentType, ExpectedOutput, OptimizationStatus,
};
use prompt_studio_core::StudioError;

#[tokio::test]
async fn ingest_registers_documents_and_indexes_chunks() {
    let (_tmp, studio, _) = open_studio().await;

    let acme = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    let garden = studio.ingest("Garden.MD", GARDEN.as_bytes()).await.unwrap();

    assert_eq!(acme.document_type, DocumentType::Txt);
    assert_eq!(garden.document_type, DocumentType::Markdown);
    assert!(acme.chunk_count >= 2, "chunk_size 120 should split the text");
    assert!(Path::new(&acme.file_path).exists());
    assert!(acme.file_path.ends_with(&format!("{}.txt", acme.id)));
    assert_eq!(acme.metadata["original_filename"], "acme.txt");
    assert_eq!(
        acme.metadata["char_count"].as_u64().unwrap() as usize,
        ACME.chars().count()
    );
    assert_eq!(acme.metadata["content_sha256"].as_str().unwrap().len(), 64);

    let listed = studio.list_documents().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, acme.id);

    let stats = studio.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.total_chunks, acme.chunk_count + garden.chunk_count);
    assert_eq!(stats.dimension, DIMS);
}

#[tokio::test]
async fn search_ranks_matching_document_first_and_honors_filter() {
    let (_tmp, studio, _) = open_studio().await;
    let acme = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    let garden = studio.ingest("garden.md", GARDEN.as_bytes()).await.unwrap();

    let hits = studio.search("tomatoes basil sun", 3, None).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].document_id, garden.id);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let only_acme = vec![acme.id.clone()];
    let filtered = studio
        .search("tomatoes basil sun", 3, Some(&only_acme))
        .await
        .unwrap();
    assert!(filtered.iter().all(|h| h.document_id == acme.id));

    let unknown = vec!["missing".to_string()];
    let err = studio.search("x", 3, Some(&unknown)).await.unwrap_err();
    assert!(matches!(err, StudioError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_chunks_registry_row_and_file() {
    let (_tmp, studio, _) = open_studio().await;
    let acme = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    let garden = studio.ingest("garden.md", GARDEN.as_bytes()).await.unwrap();

    let removed = studio.delete_document(&acme.id).await.unwrap();
    assert_eq!(removed, acme.chunk_count);
    assert!(!Path::new(&acme.file_path).exists());

    let err = studio.get_document(&acme.id).await.unwrap_err();
    assert!(matches!(err, StudioError::NotFound(_)));
    let err = studio.delete_document(&acme.id).await.unwrap_err();
    assert!(matches!(err, StudioError::NotFound(_)));

    let stats = studio.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.total_chunks, garden.chunk_count);

    let hits = studio.search("Acme robots Oslo", 5, None).await.unwrap();
    assert!(hits.iter().all(|h| h.document_id == garden.id));
}

#[tokio::test]
async fn index_survives_reopen() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), "");

    let doc = {
        let studio = open_with(config.clone(), Arc::new(WordHashEmbedder::new())).await;
        studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap()
    };

    let studio = open_with(config, Arc::new(WordHashEmbedder::new())).await;
    let stats = studio.stats().await.unwrap();
    assert_eq!(stats.total_chunks, doc.chunk_count);
    assert_eq!(stats.documents, 1);

    let hits = studio.search("industrial robots", 1, None).await.unwrap();
    assert_eq!(hits[0].document_id, doc.id);
}

#[tokio::test]
async fn clear_empties_store_and_uploads() {
    let (tmp, studio, _) = open_studio().await;
    studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    studio.ingest("garden.md", GARDEN.as_bytes()).await.unwrap();

    assert_eq!(studio.clear_documents().await.unwrap(), 2);
    assert_eq!(files_in(&tmp.path().join("data/uploads")), 0);

    let stats = studio.stats().await.unwrap();
    assert_eq!((stats.documents, stats.total_chunks), (0, 0));
    assert!(studio.search("Acme", 3, None).await.unwrap().is_empty());
    assert_eq!(studio.clear_documents().await.unwrap(), 0);
}

/// Make every DELETE on `table` abort, through a second connection.
async fn block_deletes(root: &Path, table: &str) {
    let pool = prompt_studio::db::connect(&test_config(root, "")).await.unwrap();
    sqlx::query(&format!(
        "CREATE TRIGGER block_{table} BEFORE DELETE ON {table} \
         BEGIN SELECT RAISE(ABORT, '{table} locked'); END"
    ))
    .execute(&pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn failed_registry_delete_keeps_index_in_step() {
    let (tmp, studio, _) = open_studio().await;
    let acme = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    block_deletes(tmp.path(), "documents").await;

    let err = studio.delete_document(&acme.id).await.unwrap_err();
    assert!(matches!(err, StudioError::Storage(_)));
    assert!(studio.clear_documents().await.is_err());

    let stats = studio.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.total_chunks, acme.chunk_count);
    assert!(Path::new(&acme.file_path).exists());
}

#[tokio::test]
async fn failed_index_delete_restores_registry() {
    let (tmp, studio, _) = open_studio().await;
    let acme = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    block_deletes(tmp.path(), "index_entries").await;

    let err = studio.delete_document(&acme.id).await.unwrap_err();
    assert!(matches!(err, StudioError::Storage(_)));
    assert_eq!(studio.get_document(&acme.id).await.unwrap().id, acme.id);

    assert!(studio.clear_documents().await.is_err());

    let stats = studio.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.total_chunks, acme.chunk_count);
    let hits = studio.search("Acme robots Oslo", 3, None).await.unwrap();
    assert!(hits.iter().all(|h| h.document_id == acme.id));
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn rejected_uploads_leave_nothing_behind() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(tmp.path(), "");
    config.uploads.max_file_size_mb = 1;
    let embedder = Arc::new(WordHashEmbedder::new());
    let studio = open_with(config, embedder.clone()).await;
    let uploads = tmp.path().join("data/uploads");

    let err = studio.ingest("logo.png", b"\x89PNG").await.unwrap_err();
    assert!(matches!(err, StudioError::Validation(_)));
    assert!(err.to_string().contains("logo.png"));

    let big = vec![b'a'; 1024 * 1024 + 1];
    let err = studio.ingest("big.txt", &big).await.unwrap_err();
    assert!(matches!(err, StudioError::Validation(_)));

    let err = studio.ingest("blank.txt", b"  \n\n ").await.unwrap_err();
    assert!(matches!(err, StudioError::Validation(_)));

    embedder.fail.store(true, Ordering::SeqCst);
    let err = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap_err();
    assert_eq!(err.code(), "provider_error");

    assert_eq!(files_in(&uploads), 0);
    let stats = studio.stats().await.unwrap();
    assert_eq!((stats.documents, stats.total_chunks), (0, 0));
}

#[tokio::test]
async fn duplicate_content_is_ingested_again() {
    let (_tmp, studio, _) = open_studio().await;
    let first = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    let second = studio.ingest("acme-copy.txt", ACME.as_bytes()).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(
        first.metadata["content_sha256"],
        second.metadata["content_sha256"]
    );
    assert_eq!(studio.stats().await.unwrap().documents, 2);
}

#[tokio::test]
async fn optimize_stops_once_threshold_met_after_min_iterations() {
    let (_tmp, studio, _) = open_studio().await;
    let acme = studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();
    studio.ingest("garden.md", GARDEN.as_bytes()).await.unwrap();

    let mut expected = ExpectedOutput::new("Company: {company_name}\nFounded: {founding_year}");
    expected.description = Some("Short company profile".into());

    let ids = vec![acme.id.clone()];
    let result = studio.optimize(&expected, Some(&ids)).await.unwrap();

    // Scores 0.5, 0.9: success at iteration 2 with min_iterations = 2.
    assert_eq!(result.status, OptimizationStatus::Success);
    assert_eq!(result.total_iterations, 2);
    assert_eq!(result.best_iteration, 2);
    assert!((result.final_match_score - 0.9).abs() < 1e-9);
    assert_eq!(result.iterations[0].query, "company founded headquarters");
    assert_eq!(result.iterations[1].query, "company founded headquarters year");

    for it in &result.iterations {
        assert!(!it.retrieved_contexts.is_empty());
        assert!(it.retrieved_contexts.len() <= 3);
        assert!(it
            .retrieved_contexts
            .iter()
            .all(|c| !c.contains("Tomatoes")));
    }
    assert_eq!(result.final_prompt.messages[0].role, ChatRole::System);
}

#[tokio::test]
async fn optimize_rejects_blank_template_and_unknown_documents() {
    let (_tmp, studio, _) = open_studio().await;
    studio.ingest("acme.txt", ACME.as_bytes()).await.unwrap();

    let err = studio
        .optimize(&ExpectedOutput::new("   "), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::Validation(_)));

    let unknown = vec!["nope".to_string()];
    let err = studio
        .optimize(&ExpectedOutput::new("{x}"), Some(&unknown))
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::NotFound(_)));
}

#[tokio::test]
async fn test_prompt_uses_generator() {
    let (_tmp, studio, _) = open_studio().await;

    let err = studio
        .test_prompt(&ChatPrompt {
            messages: vec![],
            model: None,
            temperature: None,
            max_tokens: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::Validation(_)));

    let output = studio
        .test_prompt(&ChatPrompt {
            messages: vec![ChatMessage::new(ChatRole::User, "hello")],
            model: None,
            temperature: None,
            max_tokens: None,
        })
        .await
        .unwrap();
    assert_eq!(output, "answer built from 5 prompt bytes");
}

#[tokio::test]
async fn llm_settings_update_validates_and_applies() {
    let (_tmp, studio, _) = open_studio().await;

    let view = studio
        .update_llm_settings(LlmUpdate {
            model: Some("gpt-4o-mini".into()),
            temperature: Some(0.3),
            base_url: Some("http://localhost:9999/v1/".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(view.model, "gpt-4o-mini");
    assert_eq!(view.base_url, "http://localhost:9999/v1");
    assert_eq!(studio.llm_settings().model, "gpt-4o-mini");

    let err = studio
        .update_llm_settings(LlmUpdate {
            temperature: Some(3.0),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, StudioError::Validation(_)));
    assert!((studio.llm_settings().temperature - 0.3).abs() < f32::EPSILON);

    let opt = studio.optimization_settings();
    assert_eq!((opt.min_iterations, opt.max_iterations, opt.top_k), (2, 4, 3));
    assert_eq!((opt.chunk_size, opt.chunk_overlap), (120, 20));
}
