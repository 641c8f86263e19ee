use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

use crate::config::Settings;

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
}

/// Start the inference runtime in the background and give it
/// `startup_delay` to come up. The child is killed when dropped.
pub async fn launch_runtime(settings: &Settings) -> anyhow::Result<Child> {
    info!("Launching runtime: {} serve", settings.runtime_binary);
    let child = Command::new(&settings.runtime_binary)
        .arg("serve")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start '{} serve'", settings.runtime_binary))?;

    tokio::time::sleep(settings.startup_delay).await;
    Ok(child)
}

/// Make sure `model` is available locally, downloading it if needed.
pub async fn pull_model(
    http_client: &reqwest::Client,
    base_url: &str,
    model: &str,
) -> anyhow::Result<()> {
    info!("Pulling model {model}");
    let resp = http_client
        .post(format!("{}/api/pull", base_url.trim_end_matches('/')))
        .json(&PullRequest {
            model,
            stream: false,
        })
        .send()
        .await
        .with_context(|| format!("runtime unreachable while pulling {model}"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("pulling {model} failed ({status}): {body}");
    }

    let response: PullResponse = resp.json().await?;
    info!("Model {model}: {}", response.status);
    Ok(())
}

/// Launch the runtime and pull the embedding and generation models.
pub async fn bootstrap_runtime(settings: &Settings) -> anyhow::Result<Child> {
    let child = launch_runtime(settings).await?;

    let http_client = reqwest::Client::new();
    for model in [&settings.embedding_model, &settings.completion_model] {
        pull_model(&http_client, &settings.runtime_url, model).await?;
    }
    Ok(child)
}
