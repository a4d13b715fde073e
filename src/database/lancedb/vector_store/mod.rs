
use super::{ArrowRecord, similarity_scores, string_column};
use crate::database::{ScoredRecord, VectorCollection, check_batch};
use crate::{RagError, Result};
use arrow::array::RecordBatchIterator;
use arrow::datatypes::DataType;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use tracing::{debug, info};

/// One LanceDB table holding records of type `R`
pub struct LanceCollection<R> {
    connection: Connection,
    table_name: String,
    dimension: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: ArrowRecord> LanceCollection<R> {
    /// Open `table_name`, creating it when missing.
    ///
    /// An existing table built for a different vector dimension is refused
    /// rather than recreated, since that would silently drop its contents.
    #[inline]
    pub async fn open(
        connection: Connection,
        table_name: &str,
        dimension: usize,
    ) -> Result<Self> {
        let collection = Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
            _record: PhantomData,
        };
        collection.initialize_table().await?;
        Ok(collection)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.dimension {
                return Err(RagError::Config(format!(
                    "table '{}' stores {}-dimensional vectors but {} were configured",
                    self.table_name, existing, self.dimension
                )));
            }
            debug!(
                "Table {} already exists with dimension {}",
                self.table_name, existing
            );
            return Ok(());
        }

        self.connection
            .create_empty_table(&self.table_name, R::schema(self.dimension))
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to create table: {e}")))?;

        info!(
            "Created table {} with {} dimensions",
            self.table_name, self.dimension
        );
        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .table()
            .await?
            .schema()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to get table schema: {e}")))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::StorageUnavailable(format!(
                    "Could not determine vector dimension of table '{}'",
                    self.table_name
                ))
            })
    }

    async fn table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to open table: {e}")))
    }

    async fn collect_records(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<R>> {
        let mut records = Vec::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RagError::StorageUnavailable(format!("Failed to read result stream: {e}"))
        })? {
            records.extend(R::from_record_batch(&batch)?);
        }
        Ok(records)
    }
}

/// SQL predicate matching a single source; quotes are escaped
fn source_predicate(source: &str) -> String {
    format!("source = '{}'", source.replace('\'', "''"))
}

#[async_trait]
impl<R: ArrowRecord> VectorCollection<R> for LanceCollection<R> {
    #[inline]
    fn name(&self) -> &str {
        &self.table_name
    }

    async fn replace_source(&self, source: &str, records: Vec<R>) -> Result<()> {
        check_batch(source, &records, Some(self.dimension))?;
        let table = self.table().await?;
        let predicate = source_predicate(source);

        if records.is_empty() {
            table.delete(&predicate).await.map_err(|e| {
                RagError::StorageUnavailable(format!("Failed to delete records: {e}"))
            })?;
            return Ok(());
        }

        let count = records.len();
        let batch = R::to_record_batch(&records, self.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        // upsert and stale-row removal land in a single table version
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .when_not_matched_by_source_delete(Some(predicate));
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to write records: {e}")))?;

        debug!(
            "Replaced {} records for {} in {}",
            count, source, self.table_name
        );
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredRecord<R>>> {
        if query_vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Searching {} with limit {} (source filter: {:?})",
            self.table_name, limit, source
        );

        let table = self.table().await?;
        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| {
                RagError::StorageUnavailable(format!("Failed to create vector search: {e}"))
            })?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(source) = source {
            query = query.only_if(source_predicate(source));
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RagError::StorageUnavailable(format!("Failed to read result stream: {e}"))
        })? {
            let scores = similarity_scores(&batch);
            hits.extend(
                R::from_record_batch(&batch)?
                    .into_iter()
                    .zip(scores)
                    .map(|(record, score)| ScoredRecord { record, score }),
            );
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn records_for_source(&self, source: &str) -> Result<Vec<R>> {
        let results = self
            .table()
            .await?
            .query()
            .only_if(source_predicate(source))
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to query records: {e}")))?;

        self.collect_records(results).await
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let mut results = self
            .table()
            .await?
            .query()
            .select(Select::Columns(vec!["source".to_string()]))
            .execute()
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to query sources: {e}")))?;

        let mut sources = BTreeSet::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RagError::StorageUnavailable(format!("Failed to read result stream: {e}"))
        })? {
            let column = string_column(&batch, "source")?;
            sources.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }
        Ok(sources.into_iter().collect())
    }

    async fn delete_source(&self, source: &str) -> Result<()> {
        self.table()
            .await?
            .delete(&source_predicate(source))
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to delete records: {e}")))?;

        info!("Deleted records for {} from {}", source, self.table_name);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to count rows: {e}")))
    }

    async fn optimize(&self) -> Result<()> {
        self.table()
            .await?
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to optimize table: {e}")))?;

        debug!("Optimized table {}", self.table_name);
        Ok(())
    }
}
