pub mod lance;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::chunk::ScoredChunk;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("Vector table not found at {0}")]
    NotFound(String),
    #[error("LanceDB error: {0}")]
    Lance(#[from] lancedb::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error("Vector table is corrupt: {0}")]
    Corrupt(String),
    #[error("Refusing to write an empty vector table")]
    EmptyTable,
    #[error("Table was built with embedding model '{table}' but '{configured}' is configured")]
    ModelMismatch { table: String, configured: String },
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Read-only view over a table of embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Find the `k` rows closest to the query, closest first.
    async fn query_similar(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Number of stored rows.
    fn len(&self) -> usize;

    /// Embedding model the stored vectors were produced with.
    fn embedding_model(&self) -> &str;
}
