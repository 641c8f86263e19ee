//! Test doubles for the model collaborators.

use async_trait::async_trait;
use async_stream::stream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::completion::{CompletionModel, Message, TextStream};
use crate::embedding::EmbeddingModel;
use crate::models::chunk::StoredChunk;

pub const MOCK_EMBEDDING_MODEL: &str = "mock-embed";

pub fn row(id: u64, vector: Vec<f32>, text: &str) -> StoredChunk {
    StoredChunk {
        id,
        vector,
        text: text.to_string(),
        source: "info.txt".to_string(),
    }
}

/// Embeds known texts to fixed vectors and everything else to a default.
pub struct MockEmbedding {
    vectors: HashMap<String, Vec<f32>>,
    fallback_dims: usize,
    fail: bool,
    query_calls: AtomicUsize,
    ingestion_calls: AtomicUsize,
}

impl MockEmbedding {
    pub fn new<'a>(vectors: impl IntoIterator<Item = (&'a str, Vec<f32>)>) -> Self {
        let vectors: HashMap<String, Vec<f32>> = vectors
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let fallback_dims = vectors.values().next().map(|v| v.len()).unwrap_or(3);
        Self {
            vectors,
            fallback_dims,
            fail: false,
            query_calls: AtomicUsize::new(0),
            ingestion_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new([])
        }
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn ingestion_calls(&self) -> usize {
        self.ingestion_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.query_calls() + self.ingestion_calls()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        self.vectors.get(text).cloned().unwrap_or_else(|| {
            let mut v = vec![0.0; self.fallback_dims];
            if let Some(last) = v.last_mut() {
                *last = 1.0;
            }
            v
        })
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedding {
    async fn embed_for_ingestion(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.ingestion_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("embedding runtime unreachable");
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    async fn embed_for_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("embedding runtime unreachable");
        }
        Ok(self.vector_for(query))
    }

    fn model_name(&self) -> &str {
        MOCK_EMBEDDING_MODEL
    }
}

/// Replays scripted fragments, optionally ending in a failure or hanging.
pub struct MockCompletion {
    fragments: Vec<String>,
    failure: Option<String>,
    hang: bool,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
    upstream_dropped: Arc<AtomicBool>,
}

/// Raises its flag when the stream holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl MockCompletion {
    pub fn new<'a>(fragments: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fragments: fragments.into_iter().map(str::to_string).collect(),
            failure: None,
            hang: false,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
            upstream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing_with(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    /// Never finish after the scripted fragments.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether the last stream handed out has been dropped.
    pub fn upstream_dropped(&self) -> bool {
        self.upstream_dropped.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages.lock().unwrap().clone()
    }
}

impl CompletionModel for MockCompletion {
    fn complete_stream(&self, messages: &[Message]) -> TextStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        let mut items: Vec<anyhow::Result<String>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some(reason) = &self.failure {
            items.push(Err(anyhow::anyhow!("{reason}")));
        }
        self.upstream_dropped.store(false, Ordering::SeqCst);
        let flag = DropFlag(self.upstream_dropped.clone());
        let hang = self.hang;
        stream! {
            let _flag = flag;
            for item in items {
                yield item;
            }
            if hang {
                std::future::pending::<()>().await;
            }
        }
        .boxed()
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}
