//! The in-memory similarity index over document chunks.
//!
//! Chunks are embedded once at build time; a search embeds the query
//! and ranks chunks by cosine similarity. Everything stays in memory,
//! sized for a corpus of company documents rather than a web crawl.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nebula_config::AppConfig;
use nebula_core::error::RetrievalError;
use nebula_core::provider::EmbeddingRequest;
use nebula_core::{Provider, Retriever};
use tracing::{debug, info, warn};

use crate::chunker::TextChunker;
use crate::corpus::{self, Document};

/// Gemini's batch embedding endpoint caps one call at 100 texts.
const EMBED_BATCH_SIZE: usize = 100;

/// One embedded chunk of a source document.
#[derive(Debug, Clone)]
struct IndexedChunk {
    text: String,
    source: String,
    embedding: Vec<f32>,
}

/// Similarity index over the document corpus.
pub struct DocumentIndex {
    provider: Arc<dyn Provider>,
    embedding_model: String,
    chunks: Vec<IndexedChunk>,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("provider", &self.provider.name())
            .field("embedding_model", &self.embedding_model)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl DocumentIndex {
    /// An index with no documents. Searches return no passages.
    pub fn empty(provider: Arc<dyn Provider>, embedding_model: impl Into<String>) -> Self {
        Self {
            provider,
            embedding_model: embedding_model.into(),
            chunks: Vec::new(),
        }
    }

    /// Chunk and embed `documents` into a searchable index.
    pub async fn build(
        provider: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
        documents: Vec<Document>,
        chunker: &TextChunker,
    ) -> std::result::Result<Self, RetrievalError> {
        let embedding_model = embedding_model.into();

        let mut texts = Vec::new();
        let mut sources = Vec::new();
        for doc in &documents {
            for chunk in chunker.split(&doc.content) {
                texts.push(chunk);
                sources.push(doc.source.clone());
            }
        }

        if texts.is_empty() {
            info!("No document chunks to index");
            return Ok(Self::empty(provider, embedding_model));
        }

        debug!(
            documents = documents.len(),
            chunks = texts.len(),
            "Embedding document chunks"
        );

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let response = provider
                .embed(EmbeddingRequest {
                    model: embedding_model.clone(),
                    inputs: batch.to_vec(),
                })
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(RetrievalError::EmbeddingFailed(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            embeddings.extend(response.embeddings);
        }

        let chunks = texts
            .into_iter()
            .zip(sources)
            .zip(embeddings)
            .map(|((text, source), embedding)| IndexedChunk {
                text,
                source,
                embedding,
            })
            .collect::<Vec<_>>();

        info!(chunks = chunks.len(), "Document index built");

        Ok(Self {
            provider,
            embedding_model,
            chunks,
        })
    }

    /// Load the corpus directory from config, chunk it, and build the
    /// index. A missing or empty directory yields an empty index.
    pub async fn from_config(
        provider: Arc<dyn Provider>,
        config: &AppConfig,
    ) -> std::result::Result<Self, RetrievalError> {
        let documents = corpus::load_corpus(Path::new(&config.retrieval.docs_dir));
        if documents.is_empty() {
            warn!(
                dir = %config.retrieval.docs_dir,
                "No documents found, retrieval will return no context"
            );
        }
        let chunker = TextChunker::new(
            config.retrieval.chunk_size,
            config.retrieval.chunk_overlap,
        );
        Self::build(
            provider,
            config.embedding_model.clone(),
            documents,
            &chunker,
        )
        .await
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl Retriever for DocumentIndex {
    fn name(&self) -> &str {
        "document_index"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
    ) -> std::result::Result<Vec<String>, RetrievalError> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        let query_embedding = response
            .embeddings
            .first()
            .ok_or_else(|| RetrievalError::QueryFailed("No embedding returned for query".into()))?;

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&chunk.embedding, query_embedding), chunk))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        for (score, chunk) in &scored {
            debug!(score, source = %chunk.source, "Retrieved chunk");
        }

        Ok(scored.into_iter().map(|(_, c)| c.text.clone()).collect())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if the vectors differ in length or are empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}
