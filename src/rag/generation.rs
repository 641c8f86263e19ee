use async_stream::stream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Fragment, FragmentStream};
use crate::completion::{CompletionModel, Message};

enum Step {
    Next(Option<anyhow::Result<String>>),
    Cancelled,
    TimedOut,
}

/// Relay a streaming completion as fragments.
///
/// Content is forwarded as it arrives. A failure, or hitting `deadline`,
/// ends the sequence with a single error fragment. Cancelling `cancel`
/// ends it silently and drops the upstream request.
pub fn stream_generation(
    model: Arc<dyn CompletionModel>,
    messages: Vec<Message>,
    deadline: Option<Duration>,
    cancel: CancellationToken,
) -> FragmentStream {
    Box::pin(stream! {
        let deadline_at = deadline.map(|d| Instant::now() + d);
        debug!("Streaming answer from {}", model.model_name());
        let mut upstream = model.complete_stream(&messages);
        let mut count = 0usize;

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = wait_until(deadline_at) => Step::TimedOut,
                next = upstream.next() => Step::Next(next),
            };

            match step {
                Step::Next(Some(Ok(text))) => {
                    if !text.is_empty() {
                        count += 1;
                        yield Fragment::Content(text);
                    }
                }
                Step::Next(Some(Err(e))) => {
                    warn!("Generation failed after {count} fragments: {e:#}");
                    yield Fragment::Error(format!("Error during AI processing: {e}"));
                    break;
                }
                Step::Next(None) => {
                    debug!("Generation finished with {count} fragments");
                    break;
                }
                Step::Cancelled => {
                    debug!("Generation cancelled after {count} fragments");
                    break;
                }
                Step::TimedOut => {
                    warn!("Generation exceeded its deadline after {count} fragments");
                    yield Fragment::Error(
                        "Error during AI processing: the model took too long to answer".to_string(),
                    );
                    break;
                }
            }
        }
    })
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
