//! Embedding-indexed similarity store over chunks.
//!
//! The index is a flat inner-product structure: every vector is normalized
//! to unit length on the way in, so a dot product is cosine similarity.
//! Positions are dense integers `0..N-1`. Alongside the vectors the index
//! keeps three maps in lockstep:
//!
//! | Map | Key → Value |
//! |-----|-------------|
//! | entries | position → chunk id, document id, chunk index, content, metadata |
//! | document positions | document id → positions owned by that document |
//! | chunk positions | chunk id → position |
//!
//! # Mutation
//!
//! Every mutating call builds the next state off to the side, hands a
//! complete [`IndexSnapshot`] to the [`IndexPersistence`] backend, and only
//! swaps the new state in once the save succeeded. A failed embedding or a
//! failed save leaves the index exactly as it was.
//!
//! Deleting a document rebuilds the index from the surviving vectors in
//! their original relative order and renumbers positions densely. This is
//! linear in corpus size.
//!
//! # Concurrency
//!
//! `VectorIndex` takes `&mut self` for mutation and `&self` for search.
//! Callers sharing one index across tasks wrap it in a single-writer lock.

pub mod memory;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{dot, normalize, EmbeddingProvider};
use crate::error::{step, Result, StudioError};
use crate::models::{Chunk, RetrievedContext};

/// How a document filter is applied during search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrategy {
    /// Take the `3 × top_k` nearest candidates, then drop those outside
    /// the allowed documents. Narrow filters may under-return.
    #[default]
    Overfetch,
    /// Score only entries owned by the allowed documents.
    Exact,
}

impl FromStr for FilterStrategy {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "overfetch" => Ok(FilterStrategy::Overfetch),
            "exact" => Ok(FilterStrategy::Exact),
            other => Err(StudioError::Validation(format!(
                "unknown filter strategy '{}' (expected overfetch or exact)",
                other
            ))),
        }
    }
}

/// One indexed chunk at a dense position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub position: usize,
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Complete persisted state: vectors plus their entries, in position order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimension: usize,
    pub entries: Vec<IndexEntry>,
    pub vectors: Vec<Vec<f32>>,
}

/// Index size summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub dimension: usize,
}

/// Durable home for an [`IndexSnapshot`].
///
/// `save` must replace the previous snapshot as a single unit: a reader
/// never observes entries from one save paired with vectors from another.
#[async_trait]
pub trait IndexPersistence: Send + Sync {
    /// Load the last saved snapshot, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<IndexSnapshot>>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &IndexSnapshot) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    dimension: usize,
    vectors: Vec<f32>,
    entries: Vec<IndexEntry>,
    doc_positions: HashMap<String, Vec<usize>>,
    chunk_positions: HashMap<String, usize>,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn vector(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Append at position `len()`. The vector must already be normalized.
    fn push(
        &mut self,
        chunk_id: String,
        document_id: String,
        chunk_index: usize,
        content: String,
        metadata: serde_json::Value,
        vector: &[f32],
    ) {
        let position = self.entries.len();
        self.vectors.extend_from_slice(vector);
        self.doc_positions
            .entry(document_id.clone())
            .or_default()
            .push(position);
        self.chunk_positions.insert(chunk_id.clone(), position);
        self.entries.push(IndexEntry {
            position,
            chunk_id,
            document_id,
            chunk_index,
            content,
            metadata,
        });
    }

    /// Rebuild from scratch with every entry not owned by `document_id`.
    fn without_document(&self, document_id: &str) -> Self {
        let mut next = Self::empty(self.dimension);
        for entry in self.entries.iter().filter(|e| e.document_id != document_id) {
            next.push(
                entry.chunk_id.clone(),
                entry.document_id.clone(),
                entry.chunk_index,
                entry.content.clone(),
                entry.metadata.clone(),
                self.vector(entry.position),
            );
        }
        next
    }

    fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        if snapshot.entries.len() != snapshot.vectors.len() {
            return Err(StudioError::Storage(format!(
                "persisted index has {} entries but {} vectors",
                snapshot.entries.len(),
                snapshot.vectors.len()
            )));
        }

        let mut state = Self::empty(snapshot.dimension);
        for (i, (entry, vector)) in snapshot
            .entries
            .into_iter()
            .zip(snapshot.vectors)
            .enumerate()
        {
            if entry.position != i {
                return Err(StudioError::Storage(format!(
                    "persisted index has a gap: expected position {}, found {}",
                    i, entry.position
                )));
            }
            if vector.len() != state.dimension {
                return Err(StudioError::Storage(format!(
                    "persisted vector at position {} has {} dimensions, expected {}",
                    i,
                    vector.len(),
                    state.dimension
                )));
            }
            state.push(
                entry.chunk_id,
                entry.document_id,
                entry.chunk_index,
                entry.content,
                entry.metadata,
                &vector,
            );
        }
        Ok(state)
    }

    fn to_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            dimension: self.dimension,
            entries: self.entries.clone(),
            vectors: (0..self.len()).map(|p| self.vector(p).to_vec()).collect(),
        }
    }
}

/// Similarity index over embedded chunks.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    persistence: Arc<dyn IndexPersistence>,
    strategy: FilterStrategy,
    state: IndexState,
}

impl VectorIndex {
    /// Load persisted state if present, else start empty.
    ///
    /// A non-empty snapshot whose dimension differs from the embedder's is
    /// rejected. An embedder reporting `0` dimensions (not configured)
    /// accepts any snapshot; searches then fail at the embedding step.
    pub async fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        persistence: Arc<dyn IndexPersistence>,
        strategy: FilterStrategy,
    ) -> Result<Self> {
        let state = match persistence.load().await? {
            Some(snapshot) if !snapshot.entries.is_empty() => {
                if embedder.dims() != 0 && snapshot.dimension != embedder.dims() {
                    return Err(StudioError::Storage(format!(
                        "persisted index has dimension {} but embedding model '{}' produces {}",
                        snapshot.dimension,
                        embedder.model_name(),
                        embedder.dims()
                    )));
                }
                IndexState::from_snapshot(snapshot)?
            }
            _ => IndexState::empty(embedder.dims()),
        };

        tracing::debug!(
            chunks = state.len(),
            documents = state.doc_positions.len(),
            "vector index opened"
        );

        Ok(Self {
            embedder,
            persistence,
            strategy,
            state,
        })
    }

    pub fn filter_strategy(&self) -> FilterStrategy {
        self.strategy
    }

    pub fn set_filter_strategy(&mut self, strategy: FilterStrategy) {
        self.strategy = strategy;
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.len() == 0
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_chunks: self.state.len(),
            total_documents: self.state.doc_positions.len(),
            dimension: self.state.dimension,
        }
    }

    /// Ids of every document with at least one indexed chunk.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.doc_positions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.state.doc_positions.contains_key(document_id)
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.state
            .chunk_positions
            .get(chunk_id)
            .map(|&p| &self.state.entries[p])
    }

    /// A document's entries in chunk order.
    pub fn document_chunks(&self, document_id: &str) -> Vec<&IndexEntry> {
        let mut out: Vec<&IndexEntry> = self
            .state
            .doc_positions
            .get(document_id)
            .map(|ps| ps.iter().map(|&p| &self.state.entries[p]).collect())
            .unwrap_or_default();
        out.sort_by_key(|e| e.chunk_index);
        out
    }

    /// Embed and append chunks, then persist. Returns the number added.
    pub async fn add(&mut self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(StudioError::provider(
                step::EMBEDDING,
                format!(
                    "expected {} vectors, provider returned {}",
                    chunks.len(),
                    vectors.len()
                ),
            ));
        }

        let mut next = self.state.clone();
        for (chunk, mut vector) in chunks.iter().zip(vectors) {
            self.check_dims(&vector)?;
            normalize(&mut vector);
            next.push(
                chunk.id.clone(),
                chunk.document_id.clone(),
                chunk.chunk_index,
                chunk.content.clone(),
                chunk.metadata.clone(),
                &vector,
            );
        }

        self.commit(next).await?;
        tracing::debug!(added = chunks.len(), total = self.state.len(), "chunks indexed");
        Ok(chunks.len())
    }

    /// Nearest chunks to `query`, highest score first.
    ///
    /// An empty or absent `document_ids` means no filter. Equal scores
    /// keep position order.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedContext>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut query_vec = self.embedder.embed(query).await?;
        self.check_dims(&query_vec)?;
        normalize(&mut query_vec);

        let filter = document_ids.filter(|ids| !ids.is_empty());
        let allowed = |doc: &str| filter.map_or(true, |ids| ids.iter().any(|id| id == doc));

        let scored: Vec<(usize, f32)> = match (filter, self.strategy) {
            (Some(_), FilterStrategy::Exact) => {
                let candidates = (0..self.state.len())
                    .filter(|&p| allowed(&self.state.entries[p].document_id));
                self.rank(&query_vec, candidates, top_k)
            }
            (Some(_), FilterStrategy::Overfetch) => self
                .rank(&query_vec, 0..self.state.len(), top_k.saturating_mul(3))
                .into_iter()
                .filter(|&(p, _)| allowed(&self.state.entries[p].document_id))
                .take(top_k)
                .collect(),
            (None, _) => self.rank(&query_vec, 0..self.state.len(), top_k),
        };

        Ok(scored
            .into_iter()
            .map(|(p, score)| {
                let e = &self.state.entries[p];
                RetrievedContext {
                    chunk_id: e.chunk_id.clone(),
                    document_id: e.document_id.clone(),
                    content: e.content.clone(),
                    score,
                    metadata: e.metadata.clone(),
                }
            })
            .collect())
    }

    /// Remove every chunk owned by `document_id`, rebuilding the index.
    ///
    /// Returns the number of chunks removed; `0` for an unknown document.
    pub async fn delete_document(&mut self, document_id: &str) -> Result<usize> {
        let Some(owned) = self.state.doc_positions.get(document_id) else {
            return Ok(0);
        };
        let removed = owned.len();

        let next = self.state.without_document(document_id);
        self.commit(next).await?;
        tracing::debug!(document_id, removed, total = self.state.len(), "index rebuilt");
        Ok(removed)
    }

    /// Drop every entry and persist the empty state.
    pub async fn clear(&mut self) -> Result<()> {
        let next = IndexState::empty(self.embedder.dims());
        self.commit(next).await
    }

    async fn commit(&mut self, next: IndexState) -> Result<()> {
        self.persistence.save(&next.to_snapshot()).await?;
        self.state = next;
        Ok(())
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.state.dimension {
            return Err(StudioError::provider(
                step::EMBEDDING,
                format!(
                    "vector has {} dimensions, index expects {}",
                    vector.len(),
                    self.state.dimension
                ),
            ));
        }
        Ok(())
    }

    /// Score `candidates` against a normalized query and keep the best `limit`.
    fn rank(
        &self,
        query: &[f32],
        candidates: impl Iterator<Item = usize>,
        limit: usize,
    ) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = candidates
            .map(|p| (p, dot(query, self.state.vector(p))))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        scored
    }
}
