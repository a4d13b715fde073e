// Dual-level index
// Pairs the document-level and chunk-level collections under one API

#[cfg(test)]
mod tests;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{
    CHUNK_COLLECTION, ChunkRecord, DOCUMENT_COLLECTION, DocumentRecord, InMemoryCollection,
    LanceCollection, ScoredRecord, VectorCollection,
};
use crate::{RagError, Result};

/// A stored document together with its chunks in sequence order
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub document: DocumentRecord,
    pub chunks: Vec<ChunkRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub average_chunks_per_document: f64,
    pub sources: Vec<String>,
}

/// Document-level and chunk-level vector collections joined by `source`.
///
/// The index owns all records. It never retries; storage failures surface as
/// [`RagError::StorageUnavailable`].
pub struct DualLevelIndex {
    documents: Arc<dyn VectorCollection<DocumentRecord>>,
    chunks: Arc<dyn VectorCollection<ChunkRecord>>,
    source_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DualLevelIndex {
    #[inline]
    pub fn new(
        documents: Arc<dyn VectorCollection<DocumentRecord>>,
        chunks: Arc<dyn VectorCollection<ChunkRecord>>,
    ) -> Self {
        Self {
            documents,
            chunks,
            source_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Index backed by in-memory collections
    #[inline]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryCollection::new(DOCUMENT_COLLECTION)),
            Arc::new(InMemoryCollection::new(CHUNK_COLLECTION)),
        )
    }

    /// Index backed by LanceDB tables under the configured base directory
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RagError::StorageUnavailable(format!(
                "Failed to create vector database directory: {e}"
            ))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to connect to LanceDB: {e}")))?;

        let dimension = config.ollama.embedding_dimension as usize;
        let documents =
            LanceCollection::<DocumentRecord>::open(connection.clone(), DOCUMENT_COLLECTION, dimension)
                .await?;
        let chunks =
            LanceCollection::<ChunkRecord>::open(connection, CHUNK_COLLECTION, dimension).await?;

        info!("Dual-level index opened at {}", db_path.display());
        Ok(Self::new(Arc::new(documents), Arc::new(chunks)))
    }

    /// Serialize writers of one source.
    ///
    /// Hold the guard across the chunk and document writes of an ingestion.
    #[inline]
    pub async fn lock_source(&self, source: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.source_locks.lock().await;
            Arc::clone(locks.entry(source.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Store or replace the single document record of `source`.
    ///
    /// Write the chunks first: the record keeps the number of chunks stored
    /// for `source` at this point.
    #[inline]
    pub async fn upsert_document(&self, source: &str, text: &str, vector: Vec<f32>) -> Result<()> {
        let chunk_count = self.chunk_count(source).await?;
        debug!("Upserting document {} with {} chunks", source, chunk_count);
        self.documents
            .replace_source(
                source,
                vec![DocumentRecord::new(source, text, vector, chunk_count)],
            )
            .await
    }

    /// Replace the complete chunk set of `source` in one write
    #[inline]
    pub async fn upsert_chunks(&self, source: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        debug!("Upserting {} chunks for {}", chunks.len(), source);
        self.chunks.replace_source(source, chunks).await
    }

    #[inline]
    pub async fn search_documents(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord<DocumentRecord>>> {
        check_k(k)?;
        self.documents.search(vector, k, None).await
    }

    /// Nearest chunks belonging to `source`; empty when it has none
    #[inline]
    pub async fn search_chunks(
        &self,
        vector: &[f32],
        k: usize,
        source: &str,
    ) -> Result<Vec<ScoredRecord<ChunkRecord>>> {
        check_k(k)?;
        self.chunks.search(vector, k, Some(source)).await
    }

    /// Sources with a document record, sorted
    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<String>> {
        self.documents.sources().await
    }

    /// Sources that have at least one chunk, sorted
    #[inline]
    pub async fn chunk_sources(&self) -> Result<Vec<String>> {
        self.chunks.sources().await
    }

    #[inline]
    pub async fn chunk_count(&self, source: &str) -> Result<usize> {
        Ok(self.chunks.records_for_source(source).await?.len())
    }

    /// Reconstruct a document from its stored records
    #[inline]
    pub async fn document(&self, source: &str) -> Result<Option<StoredDocument>> {
        let Some(document) = self.documents.records_for_source(source).await?.into_iter().next()
        else {
            return Ok(None);
        };

        let mut chunks = self.chunks.records_for_source(source).await?;
        chunks.sort_by_key(|chunk| chunk.chunk_index);

        Ok(Some(StoredDocument { document, chunks }))
    }

    #[inline]
    pub async fn stats(&self) -> Result<IndexStats> {
        let sources = self.documents.sources().await?;
        let documents = self.documents.count().await?;
        let chunks = self.chunks.count().await?;
        let average_chunks_per_document = if documents == 0 {
            0.0
        } else {
            chunks as f64 / documents as f64
        };

        Ok(IndexStats {
            documents,
            chunks,
            average_chunks_per_document,
            sources,
        })
    }

    /// Remove `source` from both levels.
    ///
    /// The document record goes first so that the coarse stage stops
    /// selecting `source` before its chunks disappear.
    #[inline]
    pub async fn delete_document(&self, source: &str) -> Result<()> {
        let _guard = self.lock_source(source).await;
        self.documents.delete_source(source).await?;
        self.chunks.delete_source(source).await?;
        info!("Deleted document {}", source);
        Ok(())
    }

    /// Remove the document record of `source` if it still has no chunks.
    ///
    /// Returns whether a record was removed.
    #[inline]
    pub async fn delete_document_without_chunks(&self, source: &str) -> Result<bool> {
        let _guard = self.lock_source(source).await;
        if self.chunk_count(source).await? > 0 || !self.has_document(source).await? {
            debug!("{} is no longer a document without chunks", source);
            return Ok(false);
        }
        self.documents.delete_source(source).await?;
        info!("Deleted document {} which had no chunks", source);
        Ok(true)
    }

    /// Remove the chunks of `source` if it still has no document record.
    ///
    /// Returns whether any chunks were removed.
    #[inline]
    pub async fn delete_orphaned_chunks(&self, source: &str) -> Result<bool> {
        let _guard = self.lock_source(source).await;
        if self.has_document(source).await? || self.chunk_count(source).await? == 0 {
            debug!("{} no longer has orphaned chunks", source);
            return Ok(false);
        }
        self.chunks.delete_source(source).await?;
        info!("Deleted orphaned chunks of {}", source);
        Ok(true)
    }

    async fn has_document(&self, source: &str) -> Result<bool> {
        Ok(!self.documents.records_for_source(source).await?.is_empty())
    }

    /// Compact both collections
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        self.chunks.optimize().await?;
        self.documents.optimize().await
    }
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::Config("k must be greater than 0".to_string()));
    }
    Ok(())
}
