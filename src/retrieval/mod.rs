// Retrieval module
// Query rewriting, multi-query expansion and similarity search over the index


pub mod multi_query;
pub mod rewriter;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RagError;
use crate::database::{SearchResult, VectorIndex};
use crate::embeddings::Embedder;

pub use multi_query::{LlmQueryExpander, MultiQueryRetriever, QueryExpander, Retrieval};
pub use rewriter::QueryRewriter;

/// What to do when the query rewrite fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteFallback {
    /// Search with the question as asked
    #[default]
    RawQuestion,
    /// Fail the request
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned per search query
    pub top_k: usize,
    /// Alternative phrasings generated per question
    pub query_variants: usize,
    pub rewrite_fallback: RewriteFallback,
    /// Answer "I don't know" without calling the model when nothing was retrieved
    pub decline_on_empty_context: bool,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 5,
            query_variants: 3,
            rewrite_fallback: RewriteFallback::RawQuestion,
            decline_on_empty_context: true,
        }
    }
}

/// A chunk returned for a search query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk identifier, when the search backend provides one
    pub id: Option<String>,
    pub content: String,
    pub source: PathBuf,
    pub page: Option<u32>,
    pub chunk_index: u32,
    pub distance: f32,
}

impl RetrievedChunk {
    /// Identity used to merge results of several queries
    #[inline]
    pub fn dedup_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.content)
    }

    /// Human readable location, e.g. `handbook.pdf (page 3)`
    #[inline]
    pub fn location(&self) -> String {
        let name = self
            .source
            .file_name()
            .map_or_else(|| self.source.display().to_string(), |n| n.to_string_lossy().into_owned());
        match self.page {
            Some(page) => format!("{} (page {})", name, page),
            None => name,
        }
    }
}

impl From<SearchResult> for RetrievedChunk {
    #[inline]
    fn from(result: SearchResult) -> Self {
        Self {
            id: Some(result.id),
            content: result.chunk_metadata.content,
            source: PathBuf::from(result.chunk_metadata.source),
            page: result.chunk_metadata.page,
            chunk_index: result.chunk_metadata.chunk_index,
            distance: result.distance,
        }
    }
}

/// Top-k nearest chunks for a text query
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> crate::Result<Vec<RetrievedChunk>>;
}

/// Embeds the query and searches the vector index
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl VectorRetriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl SimilaritySearch for VectorRetriever {
    async fn search(&self, query: &str, k: usize) -> crate::Result<Vec<RetrievedChunk>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let results = self.index.search(&vector, k).await?;
        debug!("Query {:?} matched {} chunks", query, results.len());
        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }
}
