// LanceDB vector database module
// Handles vector storage and similarity search for embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::RagError;
use crate::embeddings::Chunk;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Stable chunk identifier
    pub id: String,
    /// The vector embedding
    pub vector: Vec<f32>,
    /// Metadata about the chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// The actual text content of the chunk
    pub content: String,
    /// Path of the source file
    pub source: String,
    /// Loader file type name, e.g. "pdf"
    pub file_type: String,
    /// 1-based page for paged sources
    pub page: Option<u32>,
    /// Index of this chunk within its document
    pub chunk_index: u32,
    /// Byte offset of the chunk within its document
    pub start_index: u64,
    /// Timestamp when this embedding was created
    pub created_at: String,
}

impl EmbeddingRecord {
    /// Pair a chunk with its vector
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>, created_at: &str) -> crate::Result<Self> {
        let chunk_index = u32::try_from(chunk.chunk_index).map_err(|_| {
            RagError::Index(format!(
                "Chunk index {} of {} does not fit the index schema",
                chunk.chunk_index,
                chunk.metadata.source.display()
            ))
        })?;
        let start_index = u64::try_from(chunk.start_index).map_err(|_| {
            RagError::Index(format!("Chunk offset {} is out of range", chunk.start_index))
        })?;

        Ok(Self {
            id: chunk.id.clone(),
            vector,
            metadata: ChunkMetadata {
                content: chunk.content.clone(),
                source: chunk.metadata.source.display().to_string(),
                file_type: chunk.metadata.file_type.to_string(),
                page: chunk.metadata.page,
                chunk_index,
                start_index,
                created_at: created_at.to_string(),
            },
        })
    }
}
