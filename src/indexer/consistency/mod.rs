// Index consistency validation
// Checks that the document level and the chunk level agree on every source

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::Result;
use crate::index::DualLevelIndex;

/// Consistency check results across both index levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of document records
    pub documents: usize,
    /// Number of distinct sources in the chunk collection
    pub chunk_sources: usize,
    /// Documents that have no chunks at all
    pub documents_without_chunks: Vec<String>,
    /// Chunk sets whose document record is missing
    pub orphaned_chunk_sources: Vec<String>,
    /// Documents whose stored chunk count differs from the count recorded at ingestion
    pub incomplete_documents: Vec<DocumentConsistencyIssue>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConsistencyIssue {
    pub source: String,
    pub expected_chunks: usize,
    pub stored_chunks: usize,
}

/// Performs consistency validation over a [`DualLevelIndex`]
pub struct ConsistencyValidator<'a> {
    index: &'a DualLevelIndex,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(index: &'a DualLevelIndex) -> Self {
        Self { index }
    }

    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting index consistency validation");

        let documents: BTreeSet<String> = self.index.list_documents().await?.into_iter().collect();
        let chunk_sources: BTreeSet<String> =
            self.index.chunk_sources().await?.into_iter().collect();
        debug!(
            "Found {} documents and {} chunk sources",
            documents.len(),
            chunk_sources.len()
        );

        let documents_without_chunks: Vec<String> =
            documents.difference(&chunk_sources).cloned().collect();
        let orphaned_chunk_sources: Vec<String> =
            chunk_sources.difference(&documents).cloned().collect();

        let mut incomplete_documents = Vec::new();
        for source in documents.intersection(&chunk_sources) {
            if let Some(issue) = self.check_document(source).await? {
                incomplete_documents.push(issue);
            }
        }

        let is_consistent = documents_without_chunks.is_empty()
            && orphaned_chunk_sources.is_empty()
            && incomplete_documents.is_empty();

        let report = ConsistencyReport {
            documents: documents.len(),
            chunk_sources: chunk_sources.len(),
            documents_without_chunks,
            orphaned_chunk_sources,
            incomplete_documents,
            is_consistent,
        };

        if report.is_consistent {
            info!("Index consistency validation passed");
        } else {
            warn!("Index consistency validation found issues");
            log_consistency_issues(&report);
        }

        Ok(report)
    }

    /// Remove records that cannot serve queries: documents without chunks and
    /// chunk sets without a document. Incomplete documents are left for
    /// re-ingestion. Returns the number of sources cleaned up.
    ///
    /// Every listed source is checked again under its write lock, so sources
    /// that an ingestion completed after `report` was taken are kept.
    #[inline]
    pub async fn cleanup_inconsistencies(&self, report: &ConsistencyReport) -> Result<usize> {
        let mut cleaned = 0;

        for source in &report.documents_without_chunks {
            if self.index.delete_document_without_chunks(source).await? {
                cleaned += 1;
            }
        }

        for source in &report.orphaned_chunk_sources {
            if self.index.delete_orphaned_chunks(source).await? {
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            info!("Cleaned up {} inconsistent sources", cleaned);
        }
        Ok(cleaned)
    }

    async fn check_document(&self, source: &str) -> Result<Option<DocumentConsistencyIssue>> {
        let Some(stored) = self.index.document(source).await? else {
            return Ok(None);
        };

        let expected_chunks = stored.document.chunk_count;
        let stored_chunks = stored.chunks.len();

        Ok((expected_chunks != stored_chunks).then(|| DocumentConsistencyIssue {
            source: source.to_string(),
            expected_chunks,
            stored_chunks,
        }))
    }
}

fn log_consistency_issues(report: &ConsistencyReport) {
    if !report.documents_without_chunks.is_empty() {
        warn!(
            "Found {} documents without chunks",
            report.documents_without_chunks.len()
        );
    }

    if !report.orphaned_chunk_sources.is_empty() {
        warn!(
            "Found {} chunk sets without a document",
            report.orphaned_chunk_sources.len()
        );
    }

    for issue in &report.incomplete_documents {
        warn!(
            "Document {} has {} chunks, expected {}",
            issue.source, issue.stored_chunks, issue.expected_chunks
        );
    }
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} documents, {} chunk sets",
                self.documents, self.chunk_sources
            )
        } else {
            format!(
                "Index inconsistencies found: {} documents without chunks, {} orphaned chunk sets, {} incomplete documents",
                self.documents_without_chunks.len(),
                self.orphaned_chunk_sources.len(),
                self.incomplete_documents.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.documents_without_chunks.len()
            + self.orphaned_chunk_sources.len()
            + self.incomplete_documents.len()
    }
}
