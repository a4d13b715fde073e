// Database module
// Vector collections backing the document-level and chunk-level indexes

#[cfg(test)]
pub(crate) mod faulty;
pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::embeddings::chunking::{Chunk, chunk_id};

pub use self::lancedb::LanceCollection;
pub use memory::InMemoryCollection;

/// Table holding one record per document
pub const DOCUMENT_COLLECTION: &str = "doc_level_embeddings";
/// Table holding one record per chunk
pub const CHUNK_COLLECTION: &str = "chunk_level_embeddings";

/// Common shape of the records stored in a [`VectorCollection`]
pub trait IndexRecord: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    /// Join key between the document level and the chunk level
    fn source(&self) -> &str;
    fn vector(&self) -> &[f32];
}

/// Whole-document record, one per source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub source: String,
    pub text: String,
    pub vector: Vec<f32>,
    /// Chunks stored for this source when the document was committed
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentRecord {
    #[inline]
    pub fn new(source: &str, text: &str, vector: Vec<f32>, chunk_count: usize) -> Self {
        Self {
            id: source.to_string(),
            source: source.to_string(),
            text: text.to_string(),
            vector,
            chunk_count,
            ingested_at: Utc::now(),
        }
    }
}

impl IndexRecord for DocumentRecord {
    #[inline]
    fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    fn vector(&self) -> &[f32] {
        &self.vector
    }
}

/// Chunk record; all chunks of a document share its `source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub source: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl ChunkRecord {
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id(),
            source: chunk.source.clone(),
            text: chunk.text.clone(),
            vector,
            chunk_index: chunk.chunk_index,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
        }
    }

    /// Record spanning its whole text, for tests that only care about position
    #[cfg(test)]
    pub(crate) fn new(source: &str, chunk_index: usize, text: &str, vector: Vec<f32>) -> Self {
        Self {
            id: chunk_id(source, chunk_index),
            source: source.to_string(),
            text: text.to_string(),
            vector,
            chunk_index,
            start_offset: 0,
            end_offset: text.chars().count(),
        }
    }
}

impl IndexRecord for ChunkRecord {
    #[inline]
    fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    fn vector(&self) -> &[f32] {
        &self.vector
    }
}

/// A record returned by similarity search; higher scores are more similar
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord<R> {
    pub record: R,
    pub score: f32,
}

/// A vector collection holding one kind of record.
///
/// Search results are ordered by descending similarity; records with equal
/// scores keep the order in which they were stored.
#[async_trait]
pub trait VectorCollection<R: IndexRecord>: Send + Sync {
    /// Collection (table) name
    fn name(&self) -> &str;

    /// Replace every record of `source` with `records` as one atomic write
    async fn replace_source(&self, source: &str, records: Vec<R>) -> Result<()>;

    /// Up to `limit` nearest records, optionally only those whose source equals `source`
    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredRecord<R>>>;

    async fn records_for_source(&self, source: &str) -> Result<Vec<R>>;

    /// Distinct sources, sorted
    async fn sources(&self) -> Result<Vec<String>>;

    async fn delete_source(&self, source: &str) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Compact storage after bulk writes
    async fn optimize(&self) -> Result<()> {
        Ok(())
    }
}

/// Cosine similarity, 0.0 when either vector has zero magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Check that a batch for `source` is well formed before it is written
pub(crate) fn check_batch<R: IndexRecord>(
    source: &str,
    records: &[R],
    dimension: Option<usize>,
) -> Result<Option<usize>> {
    let mut dimension = dimension;
    for record in records {
        if record.source() != source {
            return Err(crate::RagError::Config(format!(
                "record '{}' belongs to '{}', not '{}'",
                record.id(),
                record.source(),
                source
            )));
        }
        let actual = record.vector().len();
        match dimension {
            Some(expected) if expected != actual => {
                return Err(crate::RagError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => dimension = Some(actual),
        }
    }
    Ok(dimension)
}
