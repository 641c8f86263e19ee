use async_stream::stream;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::models::api::{ChatRequest, ErrorResponse};
use crate::rag::Fragment;

/// Chat routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/stream-ask", post(stream_ask))
}

/// POST /stream-ask - Stream an answer as server-sent events.
async fn stream_ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected chat request: {rejection}");
            let status = match rejection.status() {
                StatusCode::UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let body = ErrorResponse {
                error: format!("Invalid input: {}", rejection.body_text()),
            };
            return (status, Json(body)).into_response();
        }
    };
    debug!("Answering query ({} chars)", req.query.chars().count());

    // Dropping the response stream (client gone) cancels generation.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let mut fragments = state.pipeline.answer(req.query, cancel);

    let events = stream! {
        let _guard = guard;
        while let Some(fragment) = fragments.next().await {
            yield Ok::<Event, Infallible>(to_event(fragment));
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn to_event(fragment: Fragment) -> Event {
    match fragment {
        Fragment::Content(text) => Event::default().data(strip_carriage_returns(text)),
        Fragment::Error(text) => Event::default()
            .event("error")
            .data(strip_carriage_returns(text)),
    }
}

/// SSE field values must not contain `\r`; line breaks are sent as `\n`.
fn strip_carriage_returns(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "")
    } else {
        text
    }
}
