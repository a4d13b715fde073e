// LanceDB vector database module
// Arrow schemas for the document and chunk tables and the LanceDB-backed collection


pub mod vector_store;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{ChunkRecord, DocumentRecord, IndexRecord};
use crate::{RagError, Result};

pub use vector_store::LanceCollection;

/// Conversion between typed records and Arrow record batches
pub trait ArrowRecord: IndexRecord + Sized {
    fn schema(dimension: usize) -> Arc<Schema>;

    fn to_record_batch(records: &[Self], dimension: usize) -> Result<RecordBatch>;

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

impl ArrowRecord for DocumentRecord {
    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            vector_field(dimension),
            Field::new("source", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("chunk_count", DataType::UInt64, false),
            Field::new("ingested_at", DataType::Utf8, false),
        ]))
    }

    fn to_record_batch(records: &[Self], dimension: usize) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(records.len());
        let mut sources = Vec::with_capacity(records.len());
        let mut texts = Vec::with_capacity(records.len());
        let mut chunk_counts = Vec::with_capacity(records.len());
        let mut ingested = Vec::with_capacity(records.len());

        for record in records {
            ids.push(record.id.as_str());
            sources.push(record.source.as_str());
            texts.push(record.text.as_str());
            chunk_counts.push(record.chunk_count as u64);
            ingested.push(record.ingested_at.to_rfc3339());
        }

        let arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array(records, dimension)?),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt64Array::from(chunk_counts)),
            Arc::new(StringArray::from(ingested)),
        ];

        RecordBatch::try_new(Self::schema(dimension), arrays)
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to create record batch: {e}")))
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let ids = string_column(batch, "id")?;
        let sources = string_column(batch, "source")?;
        let texts = string_column(batch, "text")?;
        let chunk_counts = u64_column(batch, "chunk_count")?;
        let ingested = string_column(batch, "ingested_at")?;
        let vectors = vector_column(batch);

        (0..batch.num_rows())
            .map(|row| -> Result<Self> {
                let ingested_at = DateTime::parse_from_rfc3339(ingested.value(row))
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| {
                        RagError::StorageUnavailable(format!("Invalid ingested_at value: {e}"))
                    })?;
                Ok(Self {
                    id: ids.value(row).to_string(),
                    source: sources.value(row).to_string(),
                    text: texts.value(row).to_string(),
                    vector: vector_at(vectors, row),
                    chunk_count: chunk_counts.value(row) as usize,
                    ingested_at,
                })
            })
            .collect()
    }
}

impl ArrowRecord for ChunkRecord {
    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            vector_field(dimension),
            Field::new("source", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt64, false),
            Field::new("start_offset", DataType::UInt64, false),
            Field::new("end_offset", DataType::UInt64, false),
        ]))
    }

    fn to_record_batch(records: &[Self], dimension: usize) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(records.len());
        let mut sources = Vec::with_capacity(records.len());
        let mut texts = Vec::with_capacity(records.len());
        let mut indices = Vec::with_capacity(records.len());
        let mut starts = Vec::with_capacity(records.len());
        let mut ends = Vec::with_capacity(records.len());

        for record in records {
            ids.push(record.id.as_str());
            sources.push(record.source.as_str());
            texts.push(record.text.as_str());
            indices.push(record.chunk_index as u64);
            starts.push(record.start_offset as u64);
            ends.push(record.end_offset as u64);
        }

        let arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array(records, dimension)?),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt64Array::from(indices)),
            Arc::new(UInt64Array::from(starts)),
            Arc::new(UInt64Array::from(ends)),
        ];

        RecordBatch::try_new(Self::schema(dimension), arrays)
            .map_err(|e| RagError::StorageUnavailable(format!("Failed to create record batch: {e}")))
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let ids = string_column(batch, "id")?;
        let sources = string_column(batch, "source")?;
        let texts = string_column(batch, "text")?;
        let indices = u64_column(batch, "chunk_index")?;
        let starts = u64_column(batch, "start_offset")?;
        let ends = u64_column(batch, "end_offset")?;
        let vectors = vector_column(batch);

        Ok((0..batch.num_rows())
            .map(|row| Self {
                id: ids.value(row).to_string(),
                source: sources.value(row).to_string(),
                text: texts.value(row).to_string(),
                vector: vector_at(vectors, row),
                chunk_index: indices.value(row) as usize,
                start_offset: starts.value(row) as usize,
                end_offset: ends.value(row) as usize,
            })
            .collect())
    }
}

fn vector_field(dimension: usize) -> Field {
    Field::new(
        "vector",
        DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Float32, false)),
            dimension as i32,
        ),
        false,
    )
}

/// Flatten record vectors into a `FixedSizeListArray`
fn vector_array<R: IndexRecord>(records: &[R], dimension: usize) -> Result<FixedSizeListArray> {
    let mut flat_values = Vec::with_capacity(records.len() * dimension);
    for record in records {
        let vector = record.vector();
        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        flat_values.extend_from_slice(vector);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::StorageUnavailable(format!("Failed to create vector array: {e}")))
}

pub(crate) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StorageUnavailable(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StorageUnavailable(format!("Invalid {name} column type")))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StorageUnavailable(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| RagError::StorageUnavailable(format!("Invalid {name} column type")))
}

/// Vector column, absent when a query projected it away
fn vector_column(batch: &RecordBatch) -> Option<&FixedSizeListArray> {
    batch
        .column_by_name("vector")
        .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>())
}

fn vector_at(vectors: Option<&FixedSizeListArray>, row: usize) -> Vec<f32> {
    vectors
        .filter(|list| !list.is_null(row))
        .and_then(|list| {
            list.value(row)
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|values| values.values().to_vec())
        })
        .unwrap_or_default()
}

/// Similarity scores from the `_distance` column of a cosine search
pub(crate) fn similarity_scores(batch: &RecordBatch) -> Vec<f32> {
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|row| {
            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
            1.0 - distance
        })
        .collect()
}
