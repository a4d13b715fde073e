// Hierarchical retriever
// Coarse document search followed by per-document chunk search


use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::database::{DocumentRecord, ScoredRecord};
use crate::embeddings::Embedder;
use crate::index::DualLevelIndex;
use crate::{RagError, Result};

const MAX_RESULT_BUDGET: usize = 20;
const MAX_TIMEOUT_SECONDS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Documents kept by the coarse stage
    pub n_docs: usize,
    /// Chunks returned per document by the fine stage
    pub n_chunks: usize,
    pub timeout_seconds: u64,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            n_docs: 3,
            n_chunks: 5,
            timeout_seconds: 30,
        }
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_counts(self.n_docs, self.n_chunks)?;
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }
        Ok(())
    }

    /// Split a single result budget `k` into document and chunk counts.
    ///
    /// `k` is clamped to `1..=20`; at least two documents and three chunks per
    /// document are always requested.
    #[inline]
    pub fn for_result_budget(k: usize) -> Self {
        let k = k.clamp(1, MAX_RESULT_BUDGET);
        let n_docs = (k / 3).max(2);
        let n_chunks = (k / n_docs).max(3);
        Self {
            n_docs,
            n_chunks,
            ..Self::default()
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn validate_counts(n_docs: usize, n_chunks: usize) -> Result<(), ConfigError> {
    if n_docs == 0 {
        return Err(ConfigError::InvalidResultCount {
            name: "n_docs",
            value: n_docs,
        });
    }
    if n_chunks == 0 {
        return Err(ConfigError::InvalidResultCount {
            name: "n_chunks",
            value: n_chunks,
        });
    }
    Ok(())
}

/// Where a retrieved chunk came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMetadata {
    pub source: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Coarse-stage similarity of the parent document
    pub document_score: f32,
    /// Zero-based position of the parent document in the coarse ranking
    pub document_rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub text: String,
    pub score: f32,
    pub metadata: ResultMetadata,
}

/// Two-stage retriever over a [`DualLevelIndex`].
///
/// Results are grouped by document in coarse-rank order and, within a
/// document, by chunk similarity. There is no re-ranking across documents, so
/// a query returns at most `n_docs * n_chunks` results.
pub struct HierarchicalRetriever {
    index: Arc<DualLevelIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl HierarchicalRetriever {
    #[inline]
    pub fn new(
        index: Arc<DualLevelIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with the configured `n_docs` and `n_chunks`
    #[inline]
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.retrieve(query, self.config.n_docs, self.config.n_chunks)
            .await
    }

    /// Retrieve, giving up after the configured timeout
    #[inline]
    pub async fn retrieve(
        &self,
        query: &str,
        n_docs: usize,
        n_chunks: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, self.run(query, n_docs, n_chunks))
            .await
            .map_err(|_| {
                warn!("Query timed out after {:?}", timeout);
                RagError::Timeout(timeout)
            })?
    }

    /// Retrieve until `cancel` fires; a cancelled query returns no partial results
    #[inline]
    pub async fn retrieve_cancellable(
        &self,
        query: &str,
        n_docs: usize,
        n_chunks: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Query cancelled");
                Err(RagError::Cancelled)
            }
            result = self.retrieve(query, n_docs, n_chunks) => result,
        }
    }

    async fn run(&self, query: &str, n_docs: usize, n_chunks: usize) -> Result<Vec<RetrievalResult>> {
        validate_counts(n_docs, n_chunks)?;

        let vector = self.embedder.embed(query).await?;

        let documents = self.index.search_documents(&vector, n_docs).await?;
        if documents.is_empty() {
            debug!("Coarse stage found no documents");
            return Ok(Vec::new());
        }

        let per_document = try_join_all(
            documents
                .iter()
                .enumerate()
                .map(|(rank, hit)| self.search_document(&vector, n_chunks, rank, hit)),
        )
        .await?;

        let results: Vec<RetrievalResult> = per_document.into_iter().flatten().collect();
        info!(
            "Retrieved {} chunks from {} documents",
            results.len(),
            documents.len()
        );
        Ok(results)
    }

    async fn search_document(
        &self,
        vector: &[f32],
        n_chunks: usize,
        rank: usize,
        hit: &ScoredRecord<DocumentRecord>,
    ) -> Result<Vec<RetrievalResult>> {
        let source = hit.record.source.as_str();
        if source.trim().is_empty() {
            // skip and continue: one unusable hit must not fail the query
            warn!("Skipping coarse hit {} ({}) without a source", rank, hit.record.id);
            return Ok(Vec::new());
        }

        let chunks = self.index.search_chunks(vector, n_chunks, source).await?;
        debug!("Document {} contributed {} chunks", source, chunks.len());

        Ok(chunks
            .into_iter()
            .map(|chunk| RetrievalResult {
                score: chunk.score,
                metadata: ResultMetadata {
                    source: chunk.record.source,
                    chunk_index: chunk.record.chunk_index,
                    start_offset: chunk.record.start_offset,
                    end_offset: chunk.record.end_offset,
                    document_score: hit.score,
                    document_rank: rank,
                },
                text: chunk.record.text,
            })
            .collect())
    }
}
