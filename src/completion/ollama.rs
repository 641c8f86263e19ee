use anyhow::Context;
use async_stream::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{CompletionModel, Message, TextStream};

/// Chat model served by a local Ollama runtime.
pub struct OllamaCompletionModel {
    model_name: String,
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

/// One NDJSON line of a streamed chat response.
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

impl OllamaCompletionModel {
    pub fn new(model_name: &str, base_url: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }
}

impl CompletionModel for OllamaCompletionModel {
    fn complete_stream(&self, messages: &[Message]) -> TextStream {
        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: messages.to_vec(),
            stream: true,
        };
        let http_client = self.http_client.clone();
        let url = format!("{}/api/chat", self.base_url);

        Box::pin(stream! {
            let resp = match send_chat(&http_client, &url, &request).await {
                Ok(resp) => resp,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut body = resp.bytes_stream();
            let mut lines = LineDecoder::default();
            loop {
                let piece = match body.next().await {
                    Some(Ok(piece)) => piece,
                    Some(Err(e)) => {
                        yield Err(anyhow::Error::from(e).context("chat stream interrupted"));
                        return;
                    }
                    None => break,
                };
                for line in lines.push(&piece) {
                    match parse_line(&line) {
                        Ok((content, done)) => {
                            if let Some(content) = content {
                                yield Ok(content);
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if let Some(line) = lines.finish() {
                match parse_line(&line) {
                    Ok((content, done)) => {
                        if let Some(content) = content {
                            yield Ok(content);
                        }
                        if done {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            yield Err(anyhow::anyhow!("Ollama closed the chat stream before completion"));
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

async fn send_chat(
    http_client: &reqwest::Client,
    url: &str,
    request: &ChatRequest,
) -> anyhow::Result<reqwest::Response> {
    let resp = http_client
        .post(url)
        .json(request)
        .send()
        .await
        .context("Ollama runtime unreachable")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama chat API error ({status}): {body}");
    }
    Ok(resp)
}

/// Decode one stream line into (content, done).
fn parse_line(line: &[u8]) -> anyhow::Result<(Option<String>, bool)> {
    let chunk: ChatChunk = serde_json::from_slice(line).context("malformed chat stream line")?;
    if let Some(error) = chunk.error {
        anyhow::bail!("{error}");
    }
    let content = chunk
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty());
    Ok((content, chunk.done))
}

/// Splits a byte stream into newline-terminated, non-blank lines.
#[derive(Default)]
struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if !line.trim_ascii().is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        if rest.trim_ascii().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}
