use std::sync::Arc;
use tracing::debug;

use crate::embedding::EmbeddingModel;
use crate::models::chunk::ScoredChunk;
use crate::vector_store::VectorStore;

/// Embeds queries and looks up the closest chunks in the table.
#[derive(Clone)]
pub struct Retriever {
    embedding_model: Arc<dyn EmbeddingModel>,
    table: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embedding_model: Arc<dyn EmbeddingModel>,
        table: Arc<dyn VectorStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_model,
            table,
            top_k,
        }
    }

    /// Top-k chunks for `query`, closest first.
    pub async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedding_model.embed_for_query(query).await?;
        let chunks = self
            .table
            .query_similar(&query_embedding, self.top_k)
            .await?;
        debug!("Retrieved {} chunks", chunks.len());
        Ok(chunks)
    }

    /// Retrieved chunk texts joined by newlines, in search order.
    pub async fn context_for(&self, query: &str) -> anyhow::Result<String> {
        let chunks = self.retrieve(query).await?;
        Ok(join_context(&chunks))
    }
}

pub fn join_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
