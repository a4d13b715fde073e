use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error(
        "Partial ingestion of '{source_id}': expected {expected} chunks, found {stored} after commit"
    )]
    PartialIngestion {
        source_id: String,
        expected: usize,
        stored: usize,
    },

    #[error("Vector dimension mismatch: collection uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Document '{0}' has no text to index")]
    EmptyDocument(String),

    #[error("File validation failed: {0}")]
    Validation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether a caller may reasonably retry the failed operation unchanged.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::StorageUnavailable(_) | Self::Timeout(_)
        )
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod retriever;

pub use index::DualLevelIndex;
pub use indexer::Indexer;
pub use retriever::{HierarchicalRetriever, RetrievalResult};
