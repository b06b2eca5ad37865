//! JSON-RPC 2.0 envelopes for the docs MCP endpoint.

use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "docs-server";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const RESOURCE_NOT_FOUND: i64 = -32002;

/// A decoded request or notification. `id` is `None` for notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcMessage {
    pub id: Option<Value>,
    pub method: String,
    pub params: Value,
}

impl JsonRpcMessage {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validates the envelope. On failure returns the error response to send
    /// back, addressed to whatever id could be recovered.
    pub fn parse(raw: &Value) -> Result<Self, JsonRpcResponse> {
        let Some(obj) = raw.as_object() else {
            return Err(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "Invalid Request: expected an object",
            ));
        };

        let id = match obj.get("id") {
            None | Some(Value::Null) => None,
            Some(id @ (Value::String(_) | Value::Number(_))) => Some(id.clone()),
            Some(_) => {
                return Err(JsonRpcResponse::error(
                    Value::Null,
                    INVALID_REQUEST,
                    "Invalid Request: id must be a string or number",
                ))
            }
        };
        let reply_to = id.clone().unwrap_or(Value::Null);

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(JsonRpcResponse::error(
                reply_to,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }
        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            return Err(JsonRpcResponse::error(
                reply_to,
                INVALID_REQUEST,
                "Invalid Request: method is required",
            ));
        };

        Ok(Self {
            id,
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// True when the payload looks like JSON-RPC rather than the `{tool, params}`
/// request shape.
pub fn is_jsonrpc_payload(payload: &Value) -> bool {
    match payload {
        Value::Object(obj) => obj.contains_key("jsonrpc"),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_object)
            .is_some_and(|obj| obj.contains_key("jsonrpc")),
        _ => false,
    }
}
