// In-memory vector collection
// Exact cosine search over records held behind a tokio RwLock


use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::debug;

use super::{IndexRecord, ScoredRecord, VectorCollection, check_batch, cosine_similarity};
use crate::{RagError, Result};

#[derive(Debug)]
struct Inner<R> {
    records: Vec<R>,
    dimension: Option<usize>,
}

/// Vector collection kept entirely in memory.
///
/// Records are scored by brute force. The first write fixes the vector
/// dimension unless one was given with [`InMemoryCollection::with_dimension`].
#[derive(Debug)]
pub struct InMemoryCollection<R> {
    name: String,
    inner: RwLock<Inner<R>>,
}

impl<R: IndexRecord> InMemoryCollection<R> {
    #[inline]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: RwLock::new(Inner {
                records: Vec::new(),
                dimension: None,
            }),
        }
    }

    #[inline]
    pub fn with_dimension(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            inner: RwLock::new(Inner {
                records: Vec::new(),
                dimension: Some(dimension),
            }),
        }
    }
}

#[async_trait]
impl<R: IndexRecord> VectorCollection<R> for InMemoryCollection<R> {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    async fn replace_source(&self, source: &str, records: Vec<R>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let dimension = check_batch(source, &records, inner.dimension)?;

        inner.records.retain(|record| record.source() != source);
        debug!(
            "Replacing {} records for {} in {}",
            records.len(),
            source,
            self.name
        );
        inner.records.extend(records);
        inner.dimension = dimension;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredRecord<R>>> {
        let inner = self.inner.read().await;
        match inner.dimension {
            Some(expected) if expected != query_vector.len() => {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
            _ => {}
        }

        let mut scored: Vec<ScoredRecord<R>> = inner
            .records
            .iter()
            .filter(|record| source.is_none_or(|s| record.source() == s))
            .map(|record| ScoredRecord {
                score: cosine_similarity(record.vector(), query_vector),
                record: record.clone(),
            })
            .collect();

        // stable: equal scores keep storage order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn records_for_source(&self, source: &str) -> Result<Vec<R>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|record| record.source() == source)
            .cloned()
            .collect())
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let sources: BTreeSet<&str> = inner.records.iter().map(IndexRecord::source).collect();
        Ok(sources.into_iter().map(str::to_string).collect())
    }

    async fn delete_source(&self, source: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.records.retain(|record| record.source() != source);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().await.records.len())
    }
}
