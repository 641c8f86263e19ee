pub mod generation;
pub mod prompt;
pub mod retriever;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::completion::CompletionModel;
use retriever::Retriever;

/// Answer given for every query while the vector table is unavailable.
pub const KNOWLEDGE_BASE_UNAVAILABLE: &str =
    "Error: the knowledge base (vector store) is not available.";

/// One piece of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Content(String),
    /// Terminal, human-readable failure. Nothing follows it.
    Error(String),
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Content(text) | Fragment::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Fragment::Error(_))
    }
}

pub type FragmentStream = BoxStream<'static, Fragment>;

/// Retrieval-augmented answer pipeline: retrieve, assemble, generate.
#[derive(Clone)]
pub struct RagPipeline {
    /// `None` when the table could not be loaded at startup.
    retriever: Option<Retriever>,
    completion_model: Arc<dyn CompletionModel>,
    generation_timeout: Option<Duration>,
}

impl RagPipeline {
    pub fn new(
        retriever: Option<Retriever>,
        completion_model: Arc<dyn CompletionModel>,
        generation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            retriever,
            completion_model,
            generation_timeout,
        }
    }

    pub fn knowledge_base_loaded(&self) -> bool {
        self.retriever.is_some()
    }

    /// Stream the answer to `query`. Never fails: problems surface as a
    /// final error fragment.
    pub fn answer(&self, query: String, cancel: CancellationToken) -> FragmentStream {
        let pipeline = self.clone();

        Box::pin(stream! {
            let Some(retriever) = pipeline.retriever else {
                error!("Knowledge base unavailable, not answering query");
                yield Fragment::Error(KNOWLEDGE_BASE_UNAVAILABLE.to_string());
                return;
            };

            let context = match retriever.context_for(&query).await {
                Ok(context) => context,
                Err(e) => {
                    error!("Retrieval failed: {e:#}");
                    yield Fragment::Error(format!("Error during AI processing: {e}"));
                    return;
                }
            };
            debug!("Context: {} chars", context.chars().count());

            let messages = prompt::assemble(&context, &query);
            let mut fragments = generation::stream_generation(
                pipeline.completion_model,
                messages,
                pipeline.generation_timeout,
                cancel,
            );
            while let Some(fragment) = fragments.next().await {
                yield fragment;
            }
        })
    }
}
