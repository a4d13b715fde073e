// Indexer module
// Turns documents into document-level and chunk-level index records

pub mod consistency;
pub mod loader;


use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::config::Config;
use crate::database::ChunkRecord;
use crate::embeddings::Embedder;
use crate::embeddings::chunking::{ChunkingConfig, split_with};
use crate::index::DualLevelIndex;
use crate::{RagError, Result};

pub use consistency::{ConsistencyReport, ConsistencyValidator, DocumentConsistencyIssue};
pub use loader::{LoaderConfig, load_document, validate_file};

const DEFAULT_EMBED_BATCH_SIZE: usize = 16;

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub source: String,
    pub chunks: usize,
    pub characters: usize,
    pub elapsed: Duration,
}

/// Ingestion pipeline: chunk, embed, then write both index levels.
///
/// Ingesting a source that is already indexed replaces its records.
pub struct Indexer {
    index: Arc<DualLevelIndex>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    loader: LoaderConfig,
    batch_size: usize,
    verify_after_commit: bool,
}

impl Indexer {
    #[inline]
    pub fn new(
        index: Arc<DualLevelIndex>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            chunking,
            loader: LoaderConfig::default(),
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            verify_after_commit: true,
        }
    }

    /// Indexer using the chunking, loader and batching settings of `config`
    #[inline]
    pub fn from_config(
        index: Arc<DualLevelIndex>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self::new(index, embedder, config.chunking)
            .with_loader_config(config.loader)
            .with_batch_size(config.ollama.batch_size as usize)
    }

    #[inline]
    pub fn with_loader_config(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Number of chunk texts handed to the embedder per call
    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Re-count stored chunks after each ingestion
    #[inline]
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_after_commit = enabled;
        self
    }

    #[inline]
    pub fn index(&self) -> &Arc<DualLevelIndex> {
        &self.index
    }

    /// Index `text` under `source`, replacing anything stored for it before
    #[inline]
    pub async fn ingest_document(&self, source: &str, text: &str) -> Result<IngestionReport> {
        let start = Instant::now();
        if source.trim().is_empty() {
            return Err(RagError::Config(
                "document source must not be blank".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument(source.to_string()));
        }

        let chunks = split_with(text, source, &self.chunking)?;
        debug!("Split {} into {} chunks", source, chunks.len());

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
        }
        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "expected {} chunk embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }
        let document_vector = self.embedder.embed(text).await?;

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::from_chunk(chunk, vector))
            .collect();
        let expected = records.len();

        {
            let _guard = self.index.lock_source(source).await;
            // chunks first: a visible document record always has its chunks
            self.index.upsert_chunks(source, records).await?;
            self.index
                .upsert_document(source, text, document_vector)
                .await?;

            if self.verify_after_commit {
                let stored = self.index.chunk_count(source).await?;
                if stored != expected {
                    error!(
                        "Chunk count mismatch for {}: expected {}, stored {}",
                        source, expected, stored
                    );
                    return Err(RagError::PartialIngestion {
                        source_id: source.to_string(),
                        expected,
                        stored,
                    });
                }
            }
        }

        let report = IngestionReport {
            source: source.to_string(),
            chunks: expected,
            characters: text.chars().count(),
            elapsed: start.elapsed(),
        };
        info!(
            "Ingested {} ({} chunks, {} chars) in {:?}",
            report.source, report.chunks, report.characters, report.elapsed
        );
        Ok(report)
    }

    /// Validate and load `path`, then ingest it under its file name
    #[inline]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionReport> {
        let document = load_document(path, &self.loader).await?;
        self.ingest_document(&document.info.file_name, &document.text)
            .await
    }
}
