use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::rag::StreamEvent;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RagRequest {
    pub question: String,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub stream: bool,
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("text/event-stream"))
}

fn event_payload(event: &StreamEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| {
        json!({ "type": "error", "data": "failed to encode stream event" }).to_string()
    })
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request: RagRequest = serde_json::from_value(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    if request.stream || wants_event_stream(&headers) {
        let events = state
            .pipeline
            .answer_stream(&request.question, request.refresh)
            .await?;
        let sse = stream::unfold(events, |mut rx| async move {
            let event = rx.recv().await?;
            let frame = Event::default().data(event_payload(&event));
            Some((Ok::<_, Infallible>(frame), rx))
        });
        return Ok(Sse::new(sse).keep_alive(KeepAlive::default()).into_response());
    }

    let answer = state
        .pipeline
        .answer(&request.question, request.refresh)
        .await?;
    Ok(Json(answer).into_response())
}

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.index.status();
    Json(json!({
        "ready": status.ready,
        "building": status.building,
        "chunks": status.chunk_count
    }))
}
