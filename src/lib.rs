//! Persona assistant: answers questions about one person by retrieving
//! snippets from a small corpus and streaming a local LLM's reply.

pub mod app;
pub mod bootstrap;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod job;
pub mod models;
pub mod parser;
pub mod rag;
pub mod routes;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
