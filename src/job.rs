//! Serverless job transport.
//!
//! A job runtime hands the worker one JSON payload per job and drains the
//! result. The bundled worker speaks JSON lines on stdin/stdout.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::api::{ChatRequest, ErrorResponse, JobOutput, JobRequest, RequestError};
use crate::rag::{Fragment, RagPipeline};

/// Delay of the echo smoke-test handler.
pub const ECHO_DELAY: Duration = Duration::from_secs(1);

/// Result of one job: a synchronous error or a stream of outputs.
pub enum JobResult {
    Error(ErrorResponse),
    Stream(BoxStream<'static, JobOutput>),
}

/// How jobs are answered.
#[derive(Clone)]
pub enum JobHandler {
    Rag(RagPipeline),
    /// Smoke test: echo the query after a delay, no retrieval or generation.
    Echo(Duration),
}

impl JobHandler {
    pub async fn handle(&self, job: JobRequest, cancel: CancellationToken) -> JobResult {
        match self {
            JobHandler::Rag(pipeline) => handle_job(pipeline, job, cancel),
            JobHandler::Echo(delay) => {
                let output = handle_echo_job(&job, *delay).await;
                JobResult::Stream(futures::stream::once(async move { output }).boxed())
            }
        }
    }
}

/// Validate the job input and start answering it.
pub fn handle_job(pipeline: &RagPipeline, job: JobRequest, cancel: CancellationToken) -> JobResult {
    let request = job
        .input
        .ok_or(RequestError::MissingInput)
        .and_then(ChatRequest::from_value);
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected job input: {e}");
            return JobResult::Error(e.into());
        }
    };

    let outputs = pipeline.answer(request.query, cancel).map(|fragment| match fragment {
        Fragment::Content(output) => JobOutput {
            output,
            error: false,
        },
        Fragment::Error(output) => JobOutput {
            output,
            error: true,
        },
    });
    JobResult::Stream(outputs.boxed())
}

pub async fn handle_echo_job(job: &JobRequest, delay: Duration) -> JobOutput {
    let query = job
        .input
        .as_ref()
        .and_then(|input| input.get("query"))
        .and_then(|q| q.as_str())
        .unwrap_or("No query found")
        .to_string();
    debug!("Echo job received query: '{query}'");

    tokio::time::sleep(delay).await;
    JobOutput {
        output: format!("Handler received: {query}"),
        error: false,
    }
}

#[derive(Serialize)]
struct WorkerLine<'a, T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct Done {
    done: bool,
}

async fn write_line<W, T>(writer: &mut W, id: Option<&str>, body: T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(&WorkerLine { id, body })?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Process jobs, one JSON object per input line, until EOF or cancellation.
/// Every job ends with a `{"done": true}` line. Returns the number of jobs read.
pub async fn run_worker<R, W>(
    handler: JobHandler,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut jobs = 0usize;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        jobs += 1;

        let job: JobRequest = match serde_json::from_str(&line) {
            Ok(job) => job,
            Err(e) => {
                warn!("Unreadable job line: {e}");
                let body = ErrorResponse {
                    error: format!("Invalid job: {e}"),
                };
                write_line(&mut writer, None, body).await?;
                write_line(&mut writer, None, Done { done: true }).await?;
                continue;
            }
        };
        let id = job.id.clone();
        info!("Job received: {}", id.as_deref().unwrap_or("<no id>"));

        match handler.handle(job, cancel.child_token()).await {
            JobResult::Error(body) => write_line(&mut writer, id.as_deref(), body).await?,
            JobResult::Stream(mut outputs) => {
                let mut count = 0usize;
                while let Some(output) = outputs.next().await {
                    write_line(&mut writer, id.as_deref(), output).await?;
                    count += 1;
                }
                debug!("Job finished with {count} outputs");
            }
        }
        write_line(&mut writer, id.as_deref(), Done { done: true }).await?;
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimilarityMetric;
    use crate::rag::retriever::Retriever;
    use crate::testing::{row, MockCompletion, MockEmbedding};
    use crate::vector_store::lance::create_table;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn job(input: Value) -> JobRequest {
        serde_json::from_value(input).unwrap()
    }

    async fn loaded_pipeline(
        dir: &TempDir,
        embedding: Arc<MockEmbedding>,
        completion: Arc<MockCompletion>,
    ) -> RagPipeline {
        let table = create_table(
            dir.path(),
            "t",
            "mock-embed",
            vec![row(0, vec![1.0, 0.0, 0.0], "He is proficient in Python and SQL.")],
            SimilarityMetric::Cosine,
        )
        .await
        .unwrap();
        let retriever = Retriever::new(embedding, Arc::new(table), 3);
        RagPipeline::new(Some(retriever), completion, None)
    }

    async fn collect(result: JobResult) -> Vec<JobOutput> {
        match result {
            JobResult::Stream(outputs) => outputs.collect().await,
            JobResult::Error(e) => panic!("unexpected error result: {}", e.error),
        }
    }

    #[tokio::test]
    async fn test_missing_input_is_error_without_calls() {
        let dir = TempDir::new().unwrap();
        let embedding = Arc::new(MockEmbedding::new([]));
        let completion = Arc::new(MockCompletion::new(["never"]));
        let pipeline = loaded_pipeline(&dir, embedding.clone(), completion.clone()).await;

        match handle_job(&pipeline, job(json!({"id": "1"})), CancellationToken::new()) {
            JobResult::Error(e) => assert_eq!(e.error, "No 'input' received in the job."),
            JobResult::Stream(_) => panic!("expected an error result"),
        }
        match handle_job(&pipeline, job(json!({"input": {"q": "hi"}})), CancellationToken::new()) {
            JobResult::Error(e) => assert!(e.error.starts_with("Invalid input: ")),
            JobResult::Stream(_) => panic!("expected an error result"),
        }
        assert_eq!(embedding.total_calls(), 0);
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_outputs_wrap_fragments() {
        let dir = TempDir::new().unwrap();
        let completion = Arc::new(MockCompletion::new(["Python", " and SQL"]).failing_with("boom"));
        let pipeline = loaded_pipeline(&dir, Arc::new(MockEmbedding::new([])), completion).await;

        let outputs = collect(handle_job(
            &pipeline,
            job(json!({"input": {"query": "What languages does he know?"}})),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0], JobOutput { output: "Python".to_string(), error: false });
        assert_eq!(outputs[1].output, " and SQL");
        assert!(outputs[2].error);
        assert_eq!(outputs[2].output, "Error during AI processing: boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_handler() {
        let output = handle_echo_job(&job(json!({"input": {"query": "ping"}})), ECHO_DELAY).await;
        assert_eq!(output.output, "Handler received: ping");

        let output = handle_echo_job(&job(json!({})), ECHO_DELAY).await;
        assert_eq!(output.output, "Handler received: No query found");
    }

    #[tokio::test]
    async fn test_worker_drains_each_job() {
        let dir = TempDir::new().unwrap();
        let completion = Arc::new(MockCompletion::new(["Hi", "!"]));
        let pipeline = loaded_pipeline(&dir, Arc::new(MockEmbedding::new([])), completion).await;

        let input = concat!(
            "{\"id\": \"a\", \"input\": {\"query\": \"hello\"}}\n",
            "\n",
            "not json\n",
            "{\"id\": \"b\"}\n",
        );
        let mut output = Vec::new();
        let jobs = run_worker(
            JobHandler::Rag(pipeline),
            input.as_bytes(),
            &mut output,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(jobs, 3);

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0], json!({"id": "a", "output": "Hi"}));
        assert_eq!(lines[1], json!({"id": "a", "output": "!"}));
        assert_eq!(lines[2], json!({"id": "a", "done": true}));
        assert!(lines[3]["error"].as_str().unwrap().starts_with("Invalid job: "));
        assert_eq!(lines[4], json!({"done": true}));
        assert_eq!(lines[5], json!({"id": "b", "error": "No 'input' received in the job."}));
        assert_eq!(lines[6], json!({"id": "b", "done": true}));
        assert_eq!(lines.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_echo_mode() {
        let input = "{\"input\": {\"query\": \"ping\"}}\n";
        let mut output = Vec::new();
        run_worker(
            JobHandler::Echo(ECHO_DELAY),
            input.as_bytes(),
            &mut output,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"output":"Handler received: ping"}"#, r#"{"done":true}"#]);
    }
}
