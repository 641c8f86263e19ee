use std::sync::Arc;
use tracing::{error, info};

use crate::completion::ollama::OllamaCompletionModel;
use crate::completion::CompletionModel;
use crate::config::Settings;
use crate::embedding::ollama::OllamaEmbeddingModel;
use crate::embedding::EmbeddingModel;
use crate::rag::retriever::Retriever;
use crate::rag::RagPipeline;
use crate::vector_store::lance::open_table;
use crate::vector_store::VectorStore;

/// Shared application state passed to all route and job handlers.
/// Built once at startup and never mutated.
pub struct AppState {
    pub settings: Settings,
    pub pipeline: RagPipeline,
}

impl AppState {
    /// Wire the pipeline from already-constructed collaborators. A table
    /// that fails to open leaves the service in degraded mode.
    pub async fn build(
        settings: Settings,
        embedding_model: Arc<dyn EmbeddingModel>,
        completion_model: Arc<dyn CompletionModel>,
    ) -> Self {
        let retriever = match open_table(
            &settings.vector_store_path,
            &settings.table_name,
            embedding_model.model_name(),
            settings.similarity_metric,
        )
        .await
        {
            Ok(table) => {
                info!(
                    "Vector store loaded: {} ({} rows embedded with {})",
                    table.path().display(),
                    table.len(),
                    table.embedding_model()
                );
                Some(Retriever::new(
                    embedding_model,
                    Arc::new(table),
                    settings.top_k,
                ))
            }
            Err(e) => {
                error!("Failed to load vector store, answering in degraded mode: {e}");
                None
            }
        };

        let pipeline = RagPipeline::new(retriever, completion_model, settings.generation_timeout);
        Self { settings, pipeline }
    }

    /// Build state backed by the Ollama runtime named in `settings`.
    pub async fn from_settings(settings: Settings) -> Self {
        let embedding_model: Arc<dyn EmbeddingModel> = Arc::new(OllamaEmbeddingModel::new(
            &settings.embedding_model,
            &settings.runtime_url,
            settings.embedding_batch_size,
        ));
        info!("Embedding model initialized: {}", settings.embedding_model);

        let completion_model: Arc<dyn CompletionModel> = Arc::new(OllamaCompletionModel::new(
            &settings.completion_model,
            &settings.runtime_url,
        ));
        info!("Completion model initialized: {}", settings.completion_model);

        Self::build(settings, embedding_model, completion_model).await
    }
}
