// Embeddings module
// Embedding provider integration and document chunking

pub mod chunking;
pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;

pub use chunking::{Chunk, ChunkingConfig, TextSpan, chunk_documents, split_text};
pub use ollama::OllamaClient;

/// Turns text into fixed-dimension vectors.
///
/// Implementations return exactly one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Name of the embedding model, recorded in the index manifest
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector"))
    }
}
