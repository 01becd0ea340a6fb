//! The application service shared by the CLI and the HTTP server.
//!
//! A [`Studio`] owns the SQLite pool, the vector index, and the model
//! providers. The index sits behind a `tokio::sync::RwLock`: ingestion,
//! deletion, and clearing take the write half, while search and
//! optimization share the read half. An optimization run therefore sees
//! one consistent index for its whole duration.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use prompt_studio_core::chunk::build_chunks;
use prompt_studio_core::embedding::EmbeddingProvider;
use prompt_studio_core::index::{FilterStrategy, VectorIndex};
use prompt_studio_core::models::{
    ChatPrompt, Document, DocumentType, ExpectedOutput, OptimizationResult, RetrievedContext,
    TemplateAnalysis, ALLOWED_EXTENSIONS,
};
use prompt_studio_core::optimize::OptimizationController;
use prompt_studio_core::providers::{EvaluationProvider, GenerationProvider, QueryProvider};
use prompt_studio_core::template::analyze_template;
use prompt_studio_core::{Result, StudioError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::evaluator::LlmJudge;
use crate::extract::extract_text;
use crate::llm::{ChatGenerator, ConnectionReport, LlmClient};
use crate::persistence::SqliteIndexPersistence;
use crate::query_designer::LlmQueryDesigner;
use crate::settings::{LlmSettings, LlmSettingsView, LlmUpdate, ProviderCell};
use crate::{db, documents, migrate};

/// The four model-backed collaborators.
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
    pub evaluator: Arc<dyn EvaluationProvider>,
    pub queries: Arc<dyn QueryProvider>,
}

impl Providers {
    /// Providers named by the config, all reading from `cell`.
    pub fn from_config(config: &Config, cell: Arc<ProviderCell>) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(&config.llm, Arc::clone(&cell))?);
        Ok(Self {
            embedder: create_embedder(&config.embedding, cell)?,
            generator: Arc::new(ChatGenerator::new(Arc::clone(&llm))),
            evaluator: Arc::new(LlmJudge::new(Arc::clone(&llm))),
            queries: Arc::new(LlmQueryDesigner::new(llm)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioStats {
    pub total_chunks: usize,
    /// Documents with at least one indexed chunk.
    pub total_documents: usize,
    pub dimension: usize,
    /// Documents in the registry.
    pub documents: usize,
}

/// Read-only view of the optimization and chunking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationView {
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub success_threshold: f64,
    pub top_k: usize,
    pub filter_strategy: FilterStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

pub struct Studio {
    config: Config,
    pool: SqlitePool,
    index: RwLock<VectorIndex>,
    cell: Arc<ProviderCell>,
    llm: LlmClient,
    generator: Arc<dyn GenerationProvider>,
    evaluator: Arc<dyn EvaluationProvider>,
    queries: Arc<dyn QueryProvider>,
}

impl Studio {
    /// Open the store and build providers from `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let cell = Arc::new(ProviderCell::new(LlmSettings::from_config(&config)));
        let providers = Providers::from_config(&config, Arc::clone(&cell))?;
        Self::with_providers(config, providers, cell).await
    }

    /// Open the store with caller-supplied providers.
    pub async fn with_providers(
        config: Config,
        providers: Providers,
        cell: Arc<ProviderCell>,
    ) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        let persistence = Arc::new(SqliteIndexPersistence::new(pool.clone()));
        let index = VectorIndex::open(
            providers.embedder,
            persistence,
            config.optimization.filter_strategy,
        )
        .await?;
        let llm = LlmClient::new(&config.llm, Arc::clone(&cell))?;

        tracing::info!(
            store = %config.store.path.display(),
            chunks = index.len(),
            "studio opened"
        );

        Ok(Self {
            config,
            pool,
            index: RwLock::new(index),
            cell,
            llm,
            generator: providers.generator,
            evaluator: providers.evaluator,
            queries: providers.queries,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ============ Documents ============

    /// Store, extract, chunk, index, and register an uploaded file.
    ///
    /// Nothing is left behind on failure: the stored file is removed and
    /// the index and registry are unchanged.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Document> {
        let (document_type, ext) = detect_type(filename)?;

        let limit = self.config.uploads.max_bytes();
        if bytes.len() as u64 > limit {
            return Err(StudioError::Validation(format!(
                "file is {} bytes, larger than the {} MB upload limit",
                bytes.len(),
                self.config.uploads.max_file_size_mb
            )));
        }

        let content_hash = format!("{:x}", Sha256::digest(bytes));
        if let Some(existing) = documents::find_by_hash(&self.pool, &content_hash).await? {
            tracing::warn!(filename, existing = %existing, "identical content already ingested");
        }

        let id = uuid::Uuid::new_v4().to_string();
        let stored = self.config.uploads.dir.join(format!("{}.{}", id, ext));
        tokio::fs::create_dir_all(&self.config.uploads.dir)
            .await
            .map_err(StudioError::storage)?;
        tokio::fs::write(&stored, bytes)
            .await
            .map_err(StudioError::storage)?;

        match self
            .index_and_register(&id, filename, document_type, &stored, bytes, &content_hash)
            .await
        {
            Ok(doc) => {
                tracing::info!(id = %doc.id, filename, chunks = doc.chunk_count, "document ingested");
                Ok(doc)
            }
            Err(e) => {
                remove_stored(&stored).await;
                tracing::warn!(filename, error = %e, "ingestion failed");
                Err(e)
            }
        }
    }

    async fn index_and_register(
        &self,
        id: &str,
        filename: &str,
        document_type: DocumentType,
        stored: &Path,
        bytes: &[u8],
        content_hash: &str,
    ) -> Result<Document> {
        let owned = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || extract_text(&owned, document_type))
            .await
            .map_err(|e| StudioError::Validation(format!("text extraction aborted: {}", e)))??;
        if text.trim().is_empty() {
            return Err(StudioError::Validation(format!(
                "no text could be extracted from {}",
                filename
            )));
        }

        let chunks = build_chunks(
            id,
            &text,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );

        let doc = Document {
            id: id.to_string(),
            filename: filename.to_string(),
            document_type,
            file_path: stored.display().to_string(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
            metadata: serde_json::json!({
                "original_filename": filename,
                "content_sha256": content_hash,
                "char_count": text.chars().count(),
            }),
        };

        let mut index = self.index.write().await;
        index.add(&chunks).await?;
        if let Err(e) = documents::insert(&self.pool, &doc, content_hash).await {
            if let Err(rollback) = index.delete_document(id).await {
                tracing::error!(id, error = %rollback, "failed to roll back indexed chunks");
            }
            return Err(e);
        }
        Ok(doc)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        documents::list(&self.pool).await
    }

    pub async fn get_document(&self, id: &str) -> Result<Document> {
        documents::get(&self.pool, id).await
    }

    /// Remove a document's registry row, chunks, and stored file.
    /// Returns the number of chunks removed.
    ///
    /// The registry row goes first. If the index then fails to persist, the
    /// row is restored so both stay in step and the call can be retried.
    pub async fn delete_document(&self, id: &str) -> Result<usize> {
        let doc = documents::get(&self.pool, id).await?;

        let removed = {
            let mut index = self.index.write().await;
            documents::delete(&self.pool, id).await?;
            match index.delete_document(id).await {
                Ok(removed) => removed,
                Err(e) => {
                    self.restore_registry(std::slice::from_ref(&doc)).await;
                    return Err(e);
                }
            }
        };
        remove_stored(Path::new(&doc.file_path)).await;

        tracing::info!(id, removed, "document deleted");
        Ok(removed)
    }

    /// Remove every document. Returns how many registry rows were removed.
    pub async fn clear_documents(&self) -> Result<u64> {
        let docs = documents::list(&self.pool).await?;

        let cleared = {
            let mut index = self.index.write().await;
            let cleared = documents::clear(&self.pool).await?;
            if let Err(e) = index.clear().await {
                self.restore_registry(&docs).await;
                return Err(e);
            }
            cleared
        };
        for doc in &docs {
            remove_stored(Path::new(&doc.file_path)).await;
        }

        tracing::info!(cleared, "all documents cleared");
        Ok(cleared)
    }

    /// Re-insert registry rows after the index refused a removal.
    async fn restore_registry(&self, docs: &[Document]) {
        for doc in docs {
            let hash = doc.metadata["content_sha256"].as_str().unwrap_or_default();
            if let Err(e) = documents::insert(&self.pool, doc, hash).await {
                tracing::error!(id = %doc.id, error = %e, "failed to restore registry row");
            }
        }
    }

    pub async fn stats(&self) -> Result<StudioStats> {
        let registered = documents::list(&self.pool).await?.len();
        let index = self.index.read().await.stats();
        Ok(StudioStats {
            total_chunks: index.total_chunks,
            total_documents: index.total_documents,
            dimension: index.dimension,
            documents: registered,
        })
    }

    // ============ Retrieval & prompts ============

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedContext>> {
        self.check_documents(document_ids).await?;
        self.index.read().await.search(query, top_k, document_ids).await
    }

    pub fn analyze(&self, expected: &ExpectedOutput) -> Result<TemplateAnalysis> {
        expected.validate()?;
        Ok(analyze_template(expected))
    }

    /// Run the optimization loop, optionally scoped to `document_ids`.
    pub async fn optimize(
        &self,
        expected: &ExpectedOutput,
        document_ids: Option<&[String]>,
    ) -> Result<OptimizationResult> {
        expected.validate()?;
        self.check_documents(document_ids).await?;

        let params = self.cell.snapshot().generation_params();
        let index = self.index.read().await;
        let controller = OptimizationController::new(
            &*index,
            self.generator.as_ref(),
            self.evaluator.as_ref(),
            self.queries.as_ref(),
            params,
            self.config.optimization.to_core(),
        );
        controller.optimize(expected, document_ids).await
    }

    /// Generate an answer for an already-assembled prompt.
    pub async fn test_prompt(&self, prompt: &ChatPrompt) -> Result<String> {
        if prompt.messages.is_empty() {
            return Err(StudioError::Validation("prompt has no messages".into()));
        }
        self.generator.generate(prompt).await
    }

    async fn check_documents(&self, document_ids: Option<&[String]>) -> Result<()> {
        for id in document_ids.unwrap_or_default() {
            documents::get(&self.pool, id).await?;
        }
        Ok(())
    }

    // ============ Settings ============

    pub fn llm_settings(&self) -> LlmSettingsView {
        self.cell.snapshot().view()
    }

    pub fn update_llm_settings(&self, update: LlmUpdate) -> Result<LlmSettingsView> {
        Ok(self.cell.update(update)?.view())
    }

    pub async fn test_connection(&self) -> Result<ConnectionReport> {
        self.llm.test_connection().await
    }

    pub fn optimization_settings(&self) -> OptimizationView {
        let opt = &self.config.optimization;
        OptimizationView {
            min_iterations: opt.min_iterations,
            max_iterations: opt.max_iterations,
            success_threshold: opt.success_threshold,
            top_k: opt.top_k,
            filter_strategy: opt.filter_strategy,
            chunk_size: self.config.chunking.chunk_size,
            chunk_overlap: self.config.chunking.chunk_overlap,
        }
    }
}

/// Document type and lowercase extension of an upload.
fn detect_type(filename: &str) -> Result<(DocumentType, String)> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    DocumentType::from_extension(&ext)
        .map(|t| (t, ext))
        .ok_or_else(|| {
            StudioError::Validation(format!(
                "unsupported file type '{}': allowed extensions are {}",
                filename,
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })
}

async fn remove_stored(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove stored file");
        }
    }
}
