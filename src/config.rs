use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "persona.toml";

// ──────────────────────────── TOML structure ────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub parser: ParserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub transport: Transport,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            transport: Transport::default(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

/// Which transport the main binary serves requests over.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Job,
    Echo,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_url")]
    pub base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_runtime_url(),
        }
    }
}

fn default_runtime_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub launch_runtime: bool,
    #[serde(default = "default_runtime_binary")]
    pub binary: String,
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            launch_runtime: false,
            binary: default_runtime_binary(),
            startup_delay_secs: default_startup_delay_secs(),
        }
    }
}

fn default_runtime_binary() -> String {
    "ollama".to_string()
}
fn default_startup_delay_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub similarity_metric: SimilarityMetric,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            similarity_metric: SimilarityMetric::default(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    32
}

/// Distance function used for nearest-neighbour search.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    L2,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    /// Upper bound on one streamed answer. 0 disables the deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_completion_model() -> String {
    "phi3:mini".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_store_path")]
    pub path: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            path: default_vector_store_path(),
            table: default_table(),
            top_k: default_top_k(),
        }
    }
}

fn default_vector_store_path() -> String {
    "./vectorstore".to_string()
}
fn default_table() -> String {
    "info_personal".to_string()
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_corpus_path")]
    pub corpus_path: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            corpus_path: default_corpus_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_corpus_path() -> String {
    "info.txt".to_string()
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

// ──────────────────────────── Resolved Settings ────────────────────────────

/// Flat settings structure resolved from TOML + environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    // API
    pub host: String,
    pub port: u16,

    // Service
    pub environment: String,
    pub transport: Transport,

    // Runtime
    pub runtime_url: String,
    pub launch_runtime: bool,
    pub runtime_binary: String,
    pub startup_delay: Duration,

    // Embedding
    pub embedding_model: String,
    pub similarity_metric: SimilarityMetric,
    pub embedding_batch_size: usize,

    // Completion
    pub completion_model: String,
    pub generation_timeout: Option<Duration>,

    // Vector store
    pub vector_store_path: PathBuf,
    pub table_name: String,
    pub top_k: usize,

    // Parser
    pub corpus_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for Settings {
    fn default() -> Self {
        resolve(TomlConfig::default(), None, None)
    }
}

/// Load settings from `PERSONA_CONFIG` or `persona.toml`, falling back to
/// the compiled-in defaults when no file exists.
pub fn load_settings() -> anyhow::Result<Settings> {
    let _ = dotenvy::dotenv();

    let path = std::env::var("PERSONA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_settings_from_path(&path)
    } else {
        tracing::info!("No config file at {path}, using defaults");
        Ok(resolve(
            TomlConfig::default(),
            std::env::var("OLLAMA_HOST").ok(),
            std::env::var("PORT").ok(),
        ))
    }
}

/// Load settings from a given TOML path. Useful for testing.
pub fn load_settings_from_path(path: impl AsRef<Path>) -> anyhow::Result<Settings> {
    // Load .env if present (ignore errors)
    let _ = dotenvy::dotenv();

    let content = std::fs::read_to_string(path.as_ref())?;
    let config: TomlConfig = toml::from_str(&content)?;

    if config.parser.chunk_overlap >= config.parser.chunk_size {
        anyhow::bail!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.parser.chunk_overlap,
            config.parser.chunk_size
        );
    }
    if config.vector_store.top_k == 0 {
        anyhow::bail!("vector_store.top_k must be at least 1");
    }

    Ok(resolve(
        config,
        std::env::var("OLLAMA_HOST").ok(),
        std::env::var("PORT").ok(),
    ))
}

fn resolve(config: TomlConfig, ollama_host: Option<String>, port: Option<String>) -> Settings {
    let runtime_url = ollama_host
        .map(|h| normalize_runtime_url(&h))
        .unwrap_or(config.runtime.base_url)
        .trim_end_matches('/')
        .to_string();
    let port = match port.map(|p| p.parse::<u16>().map_err(|e| (p, e))) {
        Some(Ok(port)) => port,
        Some(Err((raw, e))) => {
            tracing::warn!("Ignoring invalid PORT '{raw}' ({e}), using {}", config.api.port);
            config.api.port
        }
        None => config.api.port,
    };

    let generation_timeout = match config.completion.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    Settings {
        host: config.api.host,
        port,
        environment: config.service.environment,
        transport: config.service.transport,
        runtime_url,
        launch_runtime: config.bootstrap.launch_runtime,
        runtime_binary: config.bootstrap.binary,
        startup_delay: Duration::from_secs(config.bootstrap.startup_delay_secs),
        embedding_model: config.embedding.model,
        similarity_metric: config.embedding.similarity_metric,
        embedding_batch_size: config.embedding.batch_size.max(1),
        completion_model: config.completion.model,
        generation_timeout,
        vector_store_path: PathBuf::from(config.vector_store.path),
        table_name: config.vector_store.table,
        top_k: config.vector_store.top_k,
        corpus_path: PathBuf::from(config.parser.corpus_path),
        chunk_size: config.parser.chunk_size,
        chunk_overlap: config.parser.chunk_overlap,
    }
}

/// `OLLAMA_HOST` is often given as a bare `host:port`.
fn normalize_runtime_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
