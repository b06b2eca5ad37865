use serde::Serialize;
use serde_json::{json, Value};

pub const SEARCH_DOCS: &str = "search_docs";
pub const GET_DOC: &str = "get_doc";
pub const LIST_DOCS: &str = "list_docs";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

pub fn docs_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            SEARCH_DOCS,
            "Search through the documentation content using semantic search. Returns relevant chunks of documentation based on the query.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find relevant documentation"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return (default: 6)"
                    }
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::new(
            GET_DOC,
            "Get the full content of a specific documentation page by its path.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The file path to the documentation page (e.g., 'app/getting-started/page.tsx')"
                    }
                },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            LIST_DOCS,
            "List all available documentation pages, optionally filtered by directory.",
            json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "Optional directory to filter results (e.g., 'components')"
                    }
                }
            }),
        ),
    ]
}
