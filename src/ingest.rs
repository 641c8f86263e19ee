use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

use crate::config::Settings;
use crate::embedding::EmbeddingModel;
use crate::models::chunk::StoredChunk;
use crate::parser::load_chunks;
use crate::vector_store::lance::create_table;

/// Outcome of a corpus rebuild.
#[derive(Debug)]
pub struct IngestReport {
    pub chunk_count: usize,
    pub table_path: PathBuf,
}

/// Chunk the corpus, embed every chunk and overwrite the vector table.
/// Nothing is written unless every step succeeds.
pub async fn build_vectorstore(
    settings: &Settings,
    embedding_model: &dyn EmbeddingModel,
) -> anyhow::Result<IngestReport> {
    info!("Building vector store from {}", settings.corpus_path.display());

    // 1. Load and split the document.
    let chunks = load_chunks(&settings.corpus_path, settings.chunk_size, settings.chunk_overlap).await?;
    if chunks.is_empty() {
        anyhow::bail!("corpus {} contains no text", settings.corpus_path.display());
    }
    info!("Split corpus into {} chunks", chunks.len());

    // 2. Generate embeddings.
    info!("Using embedding model: {}", embedding_model.model_name());
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedding_model
        .embed_for_ingestion(&texts)
        .await
        .context("embedding the corpus failed")?;
    if embeddings.len() != chunks.len() {
        anyhow::bail!(
            "embedding model returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        );
    }

    // 3. Overwrite the table.
    let rows: Vec<StoredChunk> = chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (chunk, vector))| chunk.into_stored(i as u64, vector))
        .collect();
    let chunk_count = rows.len();

    let table = create_table(
        &settings.vector_store_path,
        &settings.table_name,
        embedding_model.model_name(),
        rows,
        settings.similarity_metric,
    )
    .await?;

    Ok(IngestReport {
        chunk_count,
        table_path: table.path().to_path_buf(),
    })
}
