// Database module
// Persistent vector index backed by LanceDB

pub mod lancedb;

pub use self::lancedb::vector_store::{IndexManifest, SearchResult, VectorIndex};
pub use self::lancedb::{ChunkMetadata, EmbeddingRecord};
