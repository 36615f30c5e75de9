// Indexer module
// Offline build path: load, chunk, embed and persist the corpus


use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::RagError;
use crate::config::Config;
use crate::database::{EmbeddingRecord, VectorIndex};
use crate::embeddings::{Chunk, Embedder, chunk_documents};
use crate::loader::{LoadFailure, load_documents};

/// Called with (embedded so far, total) after every embedding batch
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Builds a fresh vector index from chunks
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    index_dir: PathBuf,
    batch_size: usize,
    /// Dimension recorded for an index built from zero chunks
    empty_dimension: usize,
    progress: Option<Arc<ProgressFn>>,
}

/// Statistics about one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub documents_loaded: usize,
    pub files_skipped: usize,
    pub failures: Vec<LoadFailure>,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
}

impl Indexer {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, index_dir: PathBuf) -> Self {
        Self {
            embedder,
            index_dir,
            batch_size: 16,
            empty_dimension: crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION as usize,
            progress: None,
        }
    }

    #[inline]
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(embedder, config.index_path())
            .with_batch_size(config.ollama.batch_size as usize)
            .with_empty_dimension(config.ollama.embedding_dimension as usize)
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_empty_dimension(mut self, dimension: usize) -> Self {
        self.empty_dimension = dimension;
        self
    }

    #[inline]
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Load, chunk and index every document under the configured source directory
    #[inline]
    pub async fn build_from_source(
        &self,
        config: &Config,
    ) -> crate::Result<(VectorIndex, IndexingStats)> {
        let report = load_documents(config.source_path(), &config.loader)?;

        let chunks = chunk_documents(&report.documents, &config.chunking)
            .map_err(|e| RagError::Chunking(format!("{:#}", e)))?;
        info!(
            "Split {} documents into {} chunks",
            report.documents.len(),
            chunks.len()
        );

        let index = self.build(&chunks).await?;

        let stats = IndexingStats {
            documents_loaded: report.documents.len(),
            files_skipped: report.skipped,
            failures: report.failures,
            chunks_created: chunks.len(),
            embeddings_generated: index.len(),
        };
        Ok((index, stats))
    }

    /// Embed every chunk, then persist them as the new active index.
    ///
    /// Nothing is written until all vectors have been obtained, so an embedding
    /// failure leaves the current index untouched.
    #[inline]
    pub async fn build(&self, chunks: &[Chunk]) -> crate::Result<VectorIndex> {
        let vectors = self.embed_all(chunks).await?;
        let dimension = vectors.first().map_or(self.empty_dimension, Vec::len);

        let created_at = Utc::now().to_rfc3339();
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::from_chunk(chunk, vector, &created_at))
            .collect::<crate::Result<_>>()?;

        VectorIndex::build(
            &self.index_dir,
            &records,
            dimension,
            self.embedder.model_name(),
        )
        .await
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> crate::Result<Vec<Vec<f32>>> {
        let total = chunks.len();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

            if embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Expected {} embeddings, received {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            let expected = vectors.first().map_or_else(
                || embeddings.first().map_or(0, Vec::len),
                Vec::len,
            );
            if expected == 0 || embeddings.iter().any(|v| v.len() != expected) {
                return Err(RagError::Embedding(format!(
                    "Embedding provider returned vectors of inconsistent dimension (expected {})",
                    expected
                )));
            }

            vectors.extend(embeddings);
            debug!("Embedded {}/{} chunks", vectors.len(), total);
            if let Some(progress) = &self.progress {
                progress(vectors.len(), total);
            }
        }

        Ok(vectors)
    }
}
