use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::info;

use persona_rag::app::AppState;
use persona_rag::bootstrap::bootstrap_runtime;
use persona_rag::config::{load_settings, Settings, Transport};
use persona_rag::job::{run_worker, JobHandler, ECHO_DELAY};
use persona_rag::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    persona_rag::init_tracing();

    info!("Starting persona-rag...");

    // Load configuration.
    let settings = load_settings()?;
    info!(
        "Configuration loaded: environment={}, transport={:?}, runtime={}",
        settings.environment, settings.transport, settings.runtime_url
    );

    match settings.transport {
        Transport::Http => {
            let (_runtime, state) = start_service(settings).await?;
            serve_http(state).await
        }
        Transport::Job => {
            let (_runtime, state) = start_service(settings).await?;
            run_stdio_worker(JobHandler::Rag(state.pipeline.clone())).await
        }
        // The echo smoke test needs neither the runtime nor the knowledge base.
        Transport::Echo => run_stdio_worker(JobHandler::Echo(ECHO_DELAY)).await,
    }
}

/// Start the inference runtime when this process owns it, then build the
/// application state. The returned child keeps the runtime alive.
async fn start_service(settings: Settings) -> anyhow::Result<(Option<Child>, Arc<AppState>)> {
    let runtime = if settings.launch_runtime {
        Some(bootstrap_runtime(&settings).await?)
    } else {
        None
    };
    let state = Arc::new(AppState::from_settings(settings).await);
    Ok((runtime, state))
}

async fn serve_http(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.settings.host, state.settings.port).parse()?;
    let app = routes::build_router(state);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Answer JSON-line jobs from stdin until EOF or Ctrl-C.
async fn run_stdio_worker(handler: JobHandler) -> anyhow::Result<()> {
    let jobs = run_worker(
        handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_token(),
    )
    .await?;
    info!("Job worker stopped after {jobs} jobs");
    Ok(())
}

/// Token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        trigger.cancel();
    });
    token
}
