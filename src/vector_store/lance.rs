//! LanceDB-backed vector table.
//!
//! One table per corpus. Every row carries the name of the embedding model
//! that produced its vector, so a table built with another model can be
//! refused at open time.

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{VectorStore, VectorStoreError};
use crate::config::SimilarityMetric;
use crate::models::chunk::{ScoredChunk, StoredChunk};

const COLUMN_ID: &str = "id";
const COLUMN_VECTOR: &str = "vector";
const COLUMN_TEXT: &str = "text";
const COLUMN_SOURCE: &str = "source";
const COLUMN_EMBEDDING_MODEL: &str = "embedding_model";
const COLUMN_DISTANCE: &str = "_distance";

/// Handle to an opened LanceDB table.
pub struct LanceVectorTable {
    table: Table,
    path: PathBuf,
    embedding_model: String,
    dimensions: usize,
    row_count: usize,
    metric: SimilarityMetric,
}

/// Location of a table inside a vector store directory.
pub fn table_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.lance"))
}

fn distance_type(metric: SimilarityMetric) -> DistanceType {
    match metric {
        SimilarityMetric::Cosine => DistanceType::Cosine,
        SimilarityMetric::L2 => DistanceType::L2,
    }
}

fn table_schema(dimensions: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(COLUMN_ID, DataType::UInt64, false),
        Field::new(
            COLUMN_VECTOR,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimensions as i32,
            ),
            false,
        ),
        Field::new(COLUMN_TEXT, DataType::Utf8, false),
        Field::new(COLUMN_SOURCE, DataType::Utf8, false),
        Field::new(COLUMN_EMBEDDING_MODEL, DataType::Utf8, false),
    ]))
}

fn build_batch(
    embedding_model: &str,
    dimensions: usize,
    rows: &[StoredChunk],
) -> Result<(Arc<Schema>, RecordBatch), VectorStoreError> {
    let schema = table_schema(dimensions);

    let ids: ArrayRef = Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.id)));
    let vectors: ArrayRef = Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        rows.iter()
            .map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>())),
        dimensions as i32,
    ));
    let texts: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.text.as_str())));
    let sources: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.source.as_str())));
    let models: ArrayRef = Arc::new(StringArray::from_iter_values(
        std::iter::repeat(embedding_model).take(rows.len()),
    ));

    let batch = RecordBatch::try_new(schema.clone(), vec![ids, vectors, texts, sources, models])?;
    Ok((schema, batch))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, VectorStoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| VectorStoreError::Corrupt(format!("missing or mistyped column '{name}'")))
}

fn vector_dimensions(schema: &Schema) -> Result<usize, VectorStoreError> {
    match schema.field_with_name(COLUMN_VECTOR)?.data_type() {
        DataType::FixedSizeList(_, size) => Ok(*size as usize),
        other => Err(VectorStoreError::Corrupt(format!(
            "vector column has type {other}"
        ))),
    }
}

/// Write `rows` as the full contents of table `name`, replacing any previous
/// table. The overwrite commits as a single new table version, so readers
/// observe either the old rows or the new ones.
pub async fn create_table(
    dir: &Path,
    name: &str,
    embedding_model: &str,
    rows: Vec<StoredChunk>,
    metric: SimilarityMetric,
) -> Result<LanceVectorTable, VectorStoreError> {
    let dimensions = rows.first().map(|r| r.vector.len()).ok_or(VectorStoreError::EmptyTable)?;
    if let Some(bad) = rows.iter().find(|r| r.vector.len() != dimensions) {
        return Err(VectorStoreError::DimensionMismatch {
            expected: dimensions,
            got: bad.vector.len(),
        });
    }

    let (schema, batch) = build_batch(embedding_model, dimensions, &rows)?;
    let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);

    let db = lancedb::connect(&dir.to_string_lossy()).execute().await?;
    let table = db
        .create_table(name, reader)
        .mode(CreateTableMode::Overwrite)
        .execute()
        .await?;

    let path = table_path(dir, name);
    info!(
        "Wrote table {} with {} rows ({} dimensions)",
        path.display(),
        rows.len(),
        dimensions
    );

    Ok(LanceVectorTable {
        table,
        path,
        embedding_model: embedding_model.to_string(),
        dimensions,
        row_count: rows.len(),
        metric,
    })
}

/// Open table `name`, refusing tables embedded with a different model.
pub async fn open_table(
    dir: &Path,
    name: &str,
    embedding_model: &str,
    metric: SimilarityMetric,
) -> Result<LanceVectorTable, VectorStoreError> {
    let path = table_path(dir, name);
    if !path.exists() {
        return Err(VectorStoreError::NotFound(path.display().to_string()));
    }

    let db = lancedb::connect(&dir.to_string_lossy()).execute().await?;
    let table = match db.open_table(name).execute().await {
        Ok(table) => table,
        Err(lancedb::Error::TableNotFound { .. }) => {
            return Err(VectorStoreError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let dimensions = vector_dimensions(&*table.schema().await?)?;
    let row_count = table.count_rows(None).await?;

    let first: Vec<RecordBatch> = table.query().limit(1).execute().await?.try_collect().await?;
    let stored_model = match first.iter().find(|b| b.num_rows() > 0) {
        Some(batch) => column::<StringArray>(batch, COLUMN_EMBEDDING_MODEL)?.value(0).to_string(),
        None => return Err(VectorStoreError::Corrupt("table has no rows".to_string())),
    };
    if stored_model != embedding_model {
        return Err(VectorStoreError::ModelMismatch {
            table: stored_model,
            configured: embedding_model.to_string(),
        });
    }

    debug!("Opened table {} ({} rows)", path.display(), row_count);
    Ok(LanceVectorTable {
        table,
        path,
        embedding_model: stored_model,
        dimensions,
        row_count,
        metric,
    })
}

impl LanceVectorTable {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Every stored row, ordered by id.
    pub async fn rows(&self) -> Result<Vec<StoredChunk>, VectorStoreError> {
        let batches: Vec<RecordBatch> = self.table.query().execute().await?.try_collect().await?;

        let mut rows = Vec::with_capacity(self.row_count);
        for batch in &batches {
            let ids = column::<UInt64Array>(batch, COLUMN_ID)?;
            let vectors = column::<FixedSizeListArray>(batch, COLUMN_VECTOR)?;
            let texts = column::<StringArray>(batch, COLUMN_TEXT)?;
            let sources = column::<StringArray>(batch, COLUMN_SOURCE)?;
            for i in 0..batch.num_rows() {
                let values = vectors.value(i);
                let vector = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| VectorStoreError::Corrupt("vector items are not f32".to_string()))?
                    .values()
                    .to_vec();
                rows.push(StoredChunk {
                    id: ids.value(i),
                    vector,
                    text: texts.value(i).to_string(),
                    source: sources.value(i).to_string(),
                });
            }
        }
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }
}

#[async_trait]
impl VectorStore for LanceVectorTable {
    async fn query_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        if query_embedding.len() != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                got: query_embedding.len(),
            });
        }

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .nearest_to(query_embedding.to_vec())?
            .distance_type(distance_type(self.metric))
            .limit(k)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut results = Vec::with_capacity(k);
        for batch in &batches {
            let texts = column::<StringArray>(batch, COLUMN_TEXT)?;
            let sources = column::<StringArray>(batch, COLUMN_SOURCE)?;
            let distances = column::<Float32Array>(batch, COLUMN_DISTANCE)?;
            for i in 0..batch.num_rows() {
                results.push(ScoredChunk {
                    text: texts.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }

    fn len(&self) -> usize {
        self.row_count
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(id: u64, vector: Vec<f32>, text: &str) -> StoredChunk {
        StoredChunk {
            id,
            vector,
            text: text.to_string(),
            source: "info.txt".to_string(),
        }
    }

    fn sample_rows() -> Vec<StoredChunk> {
        vec![
            row(0, vec![1.0, 0.0, 0.0], "python"),
            row(1, vec![0.0, 1.0, 0.0], "hiking"),
            row(2, vec![0.7, 0.7, 0.0], "mixed"),
            row(3, vec![0.0, 0.0, 1.0], "chile"),
        ]
    }

    #[tokio::test]
    async fn test_create_then_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let table = create_table(dir.path(), "info_personal", "nomic-embed-text", sample_rows(), SimilarityMetric::Cosine)
            .await
            .unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.dimensions(), 3);
        assert!(table.path().ends_with("info_personal.lance"));
        assert!(table.path().exists());

        let reopened = open_table(dir.path(), "info_personal", "nomic-embed-text", SimilarityMetric::Cosine)
            .await
            .unwrap();
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.dimensions(), 3);
        assert_eq!(reopened.embedding_model(), "nomic-embed-text");
        assert_eq!(reopened.rows().await.unwrap(), sample_rows());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_all_rows() {
        let dir = TempDir::new().unwrap();
        create_table(dir.path(), "t", "m", sample_rows(), SimilarityMetric::Cosine)
            .await
            .unwrap();
        create_table(dir.path(), "t", "m", vec![row(0, vec![0.5, 0.5], "new")], SimilarityMetric::Cosine)
            .await
            .unwrap();

        let table = open_table(dir.path(), "t", "m", SimilarityMetric::Cosine).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.dimensions(), 2);
        let rows = table.rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "new");
    }

    #[tokio::test]
    async fn test_rejects_ragged_and_empty_rows() {
        let dir = TempDir::new().unwrap();
        let rows = vec![row(0, vec![1.0, 0.0], "a"), row(1, vec![1.0], "b")];
        let err = create_table(dir.path(), "t", "m", rows, SimilarityMetric::Cosine)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 2, got: 1 }));

        let err = create_table(dir.path(), "t", "m", Vec::new(), SimilarityMetric::Cosine)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VectorStoreError::EmptyTable));
        assert!(!table_path(dir.path(), "t").exists());
    }

    #[tokio::test]
    async fn test_open_missing_table() {
        let dir = TempDir::new().unwrap();
        let err = open_table(dir.path(), "absent", "m", SimilarityMetric::Cosine)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VectorStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_open_with_other_embedding_model() {
        let dir = TempDir::new().unwrap();
        create_table(dir.path(), "t", "nomic-embed-text", sample_rows(), SimilarityMetric::Cosine)
            .await
            .unwrap();
        let err = open_table(dir.path(), "t", "mxbai-embed-large", SimilarityMetric::Cosine)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VectorStoreError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity_and_limits() {
        let dir = TempDir::new().unwrap();
        let table = create_table(dir.path(), "t", "m", sample_rows(), SimilarityMetric::Cosine)
            .await
            .unwrap();

        let results = table.query_similar(&[0.9, 0.1, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].text, "python");
        assert_eq!(results[1].text, "mixed");
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

        let l2 = open_table(dir.path(), "t", "m", SimilarityMetric::L2).await.unwrap();
        let results = l2.query_similar(&[0.0, 0.0, 1.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "chile");
        assert!(results[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let table = create_table(dir.path(), "t", "m", sample_rows(), SimilarityMetric::Cosine)
            .await
            .unwrap();
        let err = table.query_similar(&[1.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 3, got: 2 }));
    }
}
