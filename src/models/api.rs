use serde::{Deserialize, Serialize};
use thiserror::Error;

// ──────────────────────────── Chat ────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("No 'input' received in the job.")]
    MissingInput,
    #[error("Invalid input: {0}")]
    Invalid(#[from] serde_json::Error),
}

impl ChatRequest {
    /// Validate an untyped payload into a request.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RequestError> {
        Ok(serde_json::from_value(value)?)
    }
}

// ──────────────────────────── Errors ────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<RequestError> for ErrorResponse {
    fn from(e: RequestError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

// ──────────────────────────── Jobs ────────────────────────────

/// Envelope delivered by the job runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

/// One streamed item of a job result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutput {
    pub output: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

// ──────────────────────────── Health ────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub vector_store_loaded: bool,
}
