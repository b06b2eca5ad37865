//! Per-request MCP session over the docs tools.
//!
//! Both wire shapes go through a session: it is opened for one HTTP
//! request, executes tool calls or JSON-RPC messages, and is closed when
//! the response is ready.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use uuid::Uuid;

use super::protocol::{
    JsonRpcMessage, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PROTOCOL_VERSION, RESOURCE_NOT_FOUND, SERVER_NAME,
};
use crate::core::errors::ApiError;
use crate::tools::DocsTools;

pub const LIST_RESOURCE_URI: &str = "docs://list";

pub struct McpSession {
    id: String,
    tools: Arc<DocsTools>,
    initialized: bool,
    opened_at: Instant,
    handled: usize,
}

impl McpSession {
    pub fn open(tools: Arc<DocsTools>, id: Option<String>) -> Self {
        let id = id
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::debug!(session = %id, "MCP session opened");
        Self {
            id,
            tools,
            initialized: false,
            opened_at: Instant::now(),
            handled: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn close(self) {
        tracing::debug!(
            session = %self.id,
            handled = self.handled,
            initialized = self.initialized,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "MCP session closed"
        );
    }

    /// `{tool, params}` execution.
    pub async fn execute_tool(&mut self, name: &str, params: &Value) -> Result<Value, ApiError> {
        self.handled += 1;
        self.tools.execute(name, params).await
    }

    /// Handles a single JSON-RPC message or a batch. `None` means nothing
    /// needs to be sent back (notifications only).
    pub async fn handle(&mut self, payload: Value) -> Option<Value> {
        match payload {
            Value::Array(items) => {
                if items.is_empty() {
                    return Some(json!(JsonRpcResponse::error(
                        Value::Null,
                        INVALID_REQUEST,
                        "Invalid Request: empty batch",
                    )));
                }
                let mut responses = Vec::new();
                for item in items {
                    if let Some(response) = self.handle_one(&item).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(json!(responses))
                }
            }
            single => self.handle_one(&single).await.map(|r| json!(r)),
        }
    }

    async fn handle_one(&mut self, raw: &Value) -> Option<JsonRpcResponse> {
        self.handled += 1;
        let message = match JsonRpcMessage::parse(raw) {
            Ok(message) => message,
            Err(response) => return Some(response),
        };

        let outcome = self.dispatch(&message).await;
        let id = message.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err((code, text)) => JsonRpcResponse::error(id, code, text),
        })
    }

    async fn dispatch(&mut self, message: &JsonRpcMessage) -> Result<Value, (i64, String)> {
        tracing::debug!(session = %self.id, method = %message.method, "MCP message");
        match message.method.as_str() {
            "initialize" => Ok(self.initialize(&message.params)),
            "notifications/initialized" => {
                self.initialized = true;
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.definitions() })),
            "tools/call" => self.call_tool(&message.params).await,
            "resources/list" => Ok(json!({
                "resources": [{
                    "uri": LIST_RESOURCE_URI,
                    "name": LIST_RESOURCE_URI,
                    "description": "All documentation pages",
                    "mimeType": "application/json"
                }]
            })),
            "resources/read" => self.read_resource(&message.params).await,
            other if other.starts_with("notifications/") => Ok(Value::Null),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        }
    }

    fn initialize(&mut self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn call_tool(&mut self, params: &Value) -> Result<Value, (i64, String)> {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err((INVALID_PARAMS, "tools/call requires a tool name".to_string()));
        };
        if !self.tools.definitions().iter().any(|d| d.name == name) {
            return Err((INVALID_PARAMS, format!("Unknown tool: {}", name)));
        }
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.tools.execute(name, &arguments).await {
            Ok(output) => Ok(text_result(&output, false)),
            Err(err) => {
                tracing::debug!(session = %self.id, tool = name, "tool call failed: {}", err);
                Ok(text_result(&json!({ "error": err.public_message() }), true))
            }
        }
    }

    async fn read_resource(&mut self, params: &Value) -> Result<Value, (i64, String)> {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return Err((INVALID_PARAMS, "resources/read requires a uri".to_string()));
        };

        let text = if uri == LIST_RESOURCE_URI {
            let docs = self
                .tools
                .catalog()
                .list(None)
                .await
                .map_err(|e| (INTERNAL_ERROR, e.public_message()))?;
            pretty(&json!(docs))
        } else if let Some(page_dir) = uri.strip_prefix("docs://") {
            let page = self
                .tools
                .catalog()
                .get(page_dir)
                .await
                .map_err(|e| (INTERNAL_ERROR, e.public_message()))?
                .ok_or_else(|| (RESOURCE_NOT_FOUND, format!("Resource not found: {}", uri)))?;
            pretty(&json!(page))
        } else {
            return Err((RESOURCE_NOT_FOUND, format!("Resource not found: {}", uri)));
        };

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": text
            }]
        }))
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn text_result(value: &Value, is_error: bool) -> Value {
    let mut result = json!({
        "content": [{ "type": "text", "text": pretty(value) }]
    });
    if is_error {
        result["isError"] = Value::Bool(true);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{self, ScriptedProvider};
    use crate::rag::{
        ChunkerConfig, ContentExtractor, CorpusProvider, DocsCatalog, DocsIndex, DocumentRecord,
        MemoryCorpus,
    };

    fn session() -> McpSession {
        let corpus: Arc<dyn CorpusProvider> = Arc::new(MemoryCorpus::new(
            "app",
            vec![
                DocumentRecord::new("app/page.tsx", "export const content = `# Home\nWelcome`;"),
                DocumentRecord::new(
                    "app/deployment/page.tsx",
                    "export const content = `# Deployment\nDeploy with the deploy command`;",
                ),
            ],
        ));
        let extractor = Arc::new(ContentExtractor::new().expect("patterns"));
        let index = Arc::new(DocsIndex::new(
            corpus.clone(),
            extractor.clone(),
            ChunkerConfig::default(),
            testing::service(Arc::new(ScriptedProvider::new())),
        ));
        let tools =
            DocsTools::new(index, DocsCatalog::new(corpus, extractor)).expect("tools");
        McpSession::open(Arc::new(tools), None)
    }

    fn text_of(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        serde_json::from_str(text).expect("tool output is json")
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let mut session = session();
        let init = session
            .handle(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {"protocolVersion": "2025-03-26", "capabilities": {}}}))
            .await
            .expect("response");
        assert_eq!(init["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(init["result"]["serverInfo"]["name"], "docs-server");

        assert!(session
            .handle(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await
            .is_none());

        let list = session
            .handle(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await
            .expect("response");
        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .expect("tools")
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, vec!["search_docs", "get_doc", "list_docs"]);
        session.close();
    }

    #[tokio::test]
    async fn tool_calls_return_text_content() {
        let mut session = session();
        let response = session
            .handle(json!({"jsonrpc": "2.0", "id": "s", "method": "tools/call",
                "params": {"name": "search_docs", "arguments": {"query": "deploy", "limit": 1}}}))
            .await
            .expect("response");
        assert_eq!(response["id"], "s");
        assert_eq!(response["result"]["content"][0]["type"], "text");
        let hits = text_of(&response);
        assert_eq!(hits.as_array().map(|h| h.len()), Some(1));
        assert_eq!(hits[0]["path"], "app/deployment/page.tsx");
    }

    #[tokio::test]
    async fn missing_doc_is_an_error_result_not_a_protocol_error() {
        let mut session = session();
        let response = session
            .handle(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "get_doc", "arguments": {"path": "app/missing/page.tsx"}}}))
            .await
            .expect("response");
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(text_of(&response)["error"], "Document not found");
    }

    #[tokio::test]
    async fn unknown_methods_and_tools_are_protocol_errors() {
        let mut session = session();
        let response = session
            .handle(json!({"jsonrpc": "2.0", "id": 4, "method": "prompts/list"}))
            .await
            .expect("response");
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);

        let response = session
            .handle(json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "rm_rf"}}))
            .await
            .expect("response");
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn batches_skip_notifications() {
        let mut session = session();
        let response = session
            .handle(json!([
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                {"jsonrpc": "1.0", "id": 2, "method": "ping"}
            ]))
            .await
            .expect("responses");
        let items = response.as_array().expect("batch");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["result"], json!({}));
        assert_eq!(items[1]["error"]["code"], INVALID_REQUEST);

        assert!(session
            .handle(json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn resources_expose_the_page_list_and_pages() {
        let mut session = session();
        let listed = session
            .handle(json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}))
            .await
            .expect("response");
        assert_eq!(listed["result"]["resources"][0]["uri"], "docs://list");

        let read = session
            .handle(json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read",
                "params": {"uri": "docs://list"}}))
            .await
            .expect("response");
        let text = read["result"]["contents"][0]["text"].as_str().expect("text");
        let pages: Value = serde_json::from_str(text).expect("json");
        assert_eq!(pages.as_array().map(|p| p.len()), Some(2));

        let page = session
            .handle(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/read",
                "params": {"uri": "docs://deployment"}}))
            .await
            .expect("response");
        assert!(page["result"]["contents"][0]["text"]
            .as_str()
            .is_some_and(|t| t.contains("Deployment")));

        let missing = session
            .handle(json!({"jsonrpc": "2.0", "id": 4, "method": "resources/read",
                "params": {"uri": "docs://nowhere"}}))
            .await
            .expect("response");
        assert_eq!(missing["error"]["code"], RESOURCE_NOT_FOUND);
    }
}
