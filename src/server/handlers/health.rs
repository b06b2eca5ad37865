use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.index.status();
    Json(json!({
        "status": "ok",
        "index": {
            "ready": status.ready,
            "chunkCount": status.chunk_count
        }
    }))
}
