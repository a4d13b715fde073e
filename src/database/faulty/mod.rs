// Vector collection that fails or stalls on request
// Wraps an in-memory collection for storage failure tests

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use super::{InMemoryCollection, IndexRecord, ScoredRecord, VectorCollection};
use crate::{RagError, Result};

/// Holds a `delete_source` call until the test releases it
#[derive(Debug, Default)]
pub(crate) struct DeleteGate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Debug)]
pub(crate) struct FaultyCollection<R> {
    inner: InMemoryCollection<R>,
    fail_writes: AtomicBool,
    /// Store every record of a write but the last one
    drop_last_record: AtomicBool,
    fail_search_source: Option<String>,
    delete_gate: Option<Arc<DeleteGate>>,
    pub search_calls: AtomicUsize,
}

impl<R: IndexRecord> FaultyCollection<R> {
    pub fn new(name: &str) -> Self {
        Self {
            inner: InMemoryCollection::new(name),
            fail_writes: AtomicBool::new(false),
            drop_last_record: AtomicBool::new(false),
            fail_search_source: None,
            delete_gate: None,
            search_calls: AtomicUsize::new(0),
        }
    }

    /// Fail searches restricted to `source`
    pub fn failing_search_for(mut self, source: &str) -> Self {
        self.fail_search_source = Some(source.to_string());
        self
    }

    pub fn gated_deletes(mut self, gate: Arc<DeleteGate>) -> Self {
        self.delete_gate = Some(gate);
        self
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn drop_last_record(&self, drop: bool) {
        self.drop_last_record.store(drop, Ordering::SeqCst);
    }
}

#[async_trait]
impl<R: IndexRecord> VectorCollection<R> for FaultyCollection<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn replace_source(&self, source: &str, mut records: Vec<R>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RagError::StorageUnavailable(format!(
                "write to '{}' refused",
                self.name()
            )));
        }
        if self.drop_last_record.load(Ordering::SeqCst) {
            records.pop();
        }
        self.inner.replace_source(source, records).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredRecord<R>>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if source.is_some() && source == self.fail_search_source.as_deref() {
            return Err(RagError::StorageUnavailable(format!(
                "search of '{}' refused",
                self.name()
            )));
        }
        self.inner.search(query_vector, limit, source).await
    }

    async fn records_for_source(&self, source: &str) -> Result<Vec<R>> {
        self.inner.records_for_source(source).await
    }

    async fn sources(&self) -> Result<Vec<String>> {
        self.inner.sources().await
    }

    async fn delete_source(&self, source: &str) -> Result<()> {
        if let Some(gate) = &self.delete_gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.inner.delete_source(source).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}
