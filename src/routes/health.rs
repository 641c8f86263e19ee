use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::app::AppState;
use crate::models::api::HealthResponse;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(health))
}

/// GET / - Liveness plus knowledge base status.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        vector_store_loaded: state.pipeline.knowledge_base_loaded(),
    })
}
