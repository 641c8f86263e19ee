use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingModel;

/// Embedding model served by a local Ollama runtime.
pub struct OllamaEmbeddingModel {
    model_name: String,
    base_url: String,
    http_client: reqwest::Client,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingModel {
    pub fn new(model_name: &str, base_url: &str, batch_size: usize) -> Self {
        Self {
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            batch_size: batch_size.max(1),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model_name,
            input: texts,
        };

        let resp = self
            .http_client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embedding API error ({status}): {body}");
        }

        let response: EmbedResponse = resp.json().await?;
        if response.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Ollama returned {} embeddings for {} inputs",
                response.embeddings.len(),
                texts.len()
            );
        }
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn embed_for_ingestion(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_batch(batch).await?;

            // All vectors of one corpus must share a dimensionality.
            if let Some(first) = all_embeddings.first().or(embeddings.first()) {
                let expected = first.len();
                if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                    anyhow::bail!(
                        "Embedding dimension mismatch: expected {expected}, got {}",
                        bad.len()
                    );
                }
            }

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    async fn embed_for_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        let results = self.embed_batch(&[query.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned for query"))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
