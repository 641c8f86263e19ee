use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use persona_rag::config::{load_settings, load_settings_from_path};
use persona_rag::embedding::ollama::OllamaEmbeddingModel;
use persona_rag::ingest::build_vectorstore;

#[derive(Parser, Debug)]
#[command(
    name = "build-vectorstore",
    about = "Chunk the personal-information corpus, embed it and overwrite the vector table"
)]
struct Cli {
    /// Settings file (defaults to PERSONA_CONFIG or persona.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Corpus text file, overriding parser.corpus_path
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Vector store directory, overriding vector_store.path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    persona_rag::init_tracing();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path)?,
        None => load_settings()?,
    };
    if let Some(corpus) = cli.corpus {
        settings.corpus_path = corpus;
    }
    if let Some(output) = cli.output {
        settings.vector_store_path = output;
    }

    let embedding_model = OllamaEmbeddingModel::new(
        &settings.embedding_model,
        &settings.runtime_url,
        settings.embedding_batch_size,
    );

    match build_vectorstore(&settings, &embedding_model).await {
        Ok(report) => {
            info!(
                "Vector store created at {} with {} chunks",
                report.table_path.display(),
                report.chunk_count
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to build the vector store: {e:#}");
            Err(e)
        }
    }
}
