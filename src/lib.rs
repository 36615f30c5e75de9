use std::time::Duration;

use thiserror::Error;

use crate::pipeline::PipelineStage;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Index at {path} is corrupt: {reason}")]
    IndexCorrupt { path: String, reason: String },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<RagError>,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session is not authenticated")]
    Unauthenticated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Short message suitable for showing to the person who asked the question
    #[inline]
    pub fn user_message(&self) -> String {
        match self {
            Self::Stage { source, .. } => source.user_message(),
            Self::Timeout(after) => format!(
                "The request took longer than {} seconds and was cancelled.",
                after.as_secs()
            ),
            Self::Embedding(_) => {
                "The embedding service is unavailable, please try again later.".to_string()
            }
            Self::Generation(_) => {
                "The language model is unavailable, please try again later.".to_string()
            }
            Self::Retrieval(_) => "Searching the knowledge base failed.".to_string(),
            Self::Unauthenticated => "Please enter the password first.".to_string(),
            Self::Index(_) | Self::IndexCorrupt { .. } => {
                "The knowledge base index is unavailable. Try re-indexing.".to_string()
            }
            Self::Config(message) => format!("Configuration problem: {}", message),
            Self::Ingestion(_) | Self::Chunking(_) => {
                "The source documents could not be processed.".to_string()
            }
            Self::Io(_) | Self::Other(_) => {
                "Sorry, something went wrong while processing your request.".to_string()
            }
        }
    }

    /// The pipeline stage this error was raised in, if it came out of a query
    #[inline]
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod indexer;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod retrieval;
pub mod session;

#[cfg(test)]
mod test_support;
