use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::mcp::protocol::{JsonRpcResponse, PARSE_ERROR};
use crate::mcp::{is_jsonrpc_payload, McpSession};
use crate::state::AppState;

pub const SESSION_HEADER: &str = "mcp-session-id";

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn invoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            // a malformed body can still be recognized as an attempted JSON-RPC call
            if String::from_utf8_lossy(&body).contains("\"jsonrpc\"") {
                let reply = JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error");
                return Ok((StatusCode::BAD_REQUEST, Json(json!(reply))).into_response());
            }
            return Err(ApiError::BadRequest(format!("Invalid JSON body: {}", e)));
        }
    };

    let mut session = McpSession::open(state.tools.clone(), session_id(&headers));

    if is_jsonrpc_payload(&payload) {
        let reply = session.handle(payload).await;
        let id = session.id().to_string();
        session.close();

        let mut response = match reply {
            Some(body) => Json(body).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        };
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
        return Ok(response);
    }

    let Some(tool) = payload.get("tool").and_then(Value::as_str) else {
        session.close();
        return Err(ApiError::BadRequest("Missing tool name".to_string()));
    };
    let params = payload.get("params").cloned().unwrap_or(Value::Null);
    let result = session.execute_tool(tool, &params).await;
    session.close();

    let content = result?;
    Ok(Json(json!({ "content": content })).into_response())
}

pub async fn describe(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.index.status();
    Json(json!({
        "tools": state.tools.definitions(),
        "index": {
            "ready": status.ready,
            "chunkCount": status.chunk_count
        }
    }))
}
