use std::sync::Arc;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::definitions::{docs_tool_definitions, ToolDefinition, GET_DOC, LIST_DOCS, SEARCH_DOCS};
use crate::core::errors::ApiError;
use crate::rag::{DocsCatalog, DocsIndex};

pub const DEFAULT_SEARCH_LIMIT: usize = 6;
pub const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub uri: String,
    pub score: f64,
    pub text: String,
}

struct RegisteredTool {
    definition: ToolDefinition,
    validator: Validator,
}

/// The docs tools shared by the REST and JSON-RPC surfaces.
pub struct DocsTools {
    index: Arc<DocsIndex>,
    catalog: DocsCatalog,
    tools: Vec<RegisteredTool>,
}

fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

fn clamp_limit(raw: Option<&Value>) -> usize {
    match raw.and_then(Value::as_f64) {
        Some(limit) if limit.is_finite() => (limit.trunc().max(1.0) as usize).min(MAX_SEARCH_LIMIT),
        _ => DEFAULT_SEARCH_LIMIT,
    }
}

impl DocsTools {
    pub fn new(index: Arc<DocsIndex>, catalog: DocsCatalog) -> Result<Self, ApiError> {
        let tools = docs_tool_definitions()
            .into_iter()
            .map(|definition| {
                let validator = jsonschema::validator_for(&definition.input_schema).map_err(|e| {
                    ApiError::Internal(format!("Invalid schema for {}: {}", definition.name, e))
                })?;
                Ok(RegisteredTool {
                    definition,
                    validator,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(Self {
            index,
            catalog,
            tools,
        })
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    fn validate(&self, name: &str, params: &Value) -> Result<(), ApiError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown tool: {}", name)))?;

        let problems: Vec<String> = tool
            .validator
            .iter_errors(params)
            .map(|e| e.to_string())
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ApiError::BadRequest(format!(
                "Invalid arguments for {}: {}",
                name,
                problems.join("; ")
            )))
        }
    }

    /// Validates `params` against the tool's schema and runs it.
    pub async fn execute(&self, name: &str, params: &Value) -> Result<Value, ApiError> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        self.validate(name, &params)?;
        tracing::debug!("Executing tool {}", name);

        match name {
            SEARCH_DOCS => {
                let query = params["query"].as_str().unwrap_or_default();
                let limit = clamp_limit(params.get("limit"));
                let hits = self.search_docs(query, limit).await?;
                Ok(json!(hits))
            }
            GET_DOC => {
                let path = params["path"].as_str().unwrap_or_default();
                let page = self
                    .catalog
                    .get(path)
                    .await?
                    .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;
                Ok(json!(page))
            }
            LIST_DOCS => {
                let directory = params.get("directory").and_then(Value::as_str);
                Ok(json!(self.catalog.list(directory).await?))
            }
            other => Err(ApiError::BadRequest(format!("Unknown tool: {}", other))),
        }
    }

    pub async fn search_docs(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::BadRequest("Query is required".to_string()));
        }
        let results = self.index.query(query, limit.clamp(1, MAX_SEARCH_LIMIT)).await?;
        Ok(results
            .into_iter()
            .map(|r| SearchHit {
                path: r.chunk.path,
                uri: r.chunk.uri,
                score: round_score(r.score),
                text: r.chunk.text,
            })
            .collect())
    }

    pub fn index(&self) -> &DocsIndex {
        &self.index
    }

    pub fn catalog(&self) -> &DocsCatalog {
        &self.catalog
    }
}
