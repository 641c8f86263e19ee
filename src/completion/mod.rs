pub mod ollama;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Incremental text produced by a streaming completion.
pub type TextStream = BoxStream<'static, anyhow::Result<String>>;

/// Abstract completion model interface.
pub trait CompletionModel: Send + Sync {
    /// Start a streaming completion. Nothing is sent to the model until the
    /// returned stream is first polled; dropping it abandons the request.
    fn complete_stream(&self, messages: &[Message]) -> TextStream;

    /// Name of the model answering the requests.
    fn model_name(&self) -> &str;
}
