pub mod definitions;
pub mod executor;

pub use definitions::{docs_tool_definitions, ToolDefinition};
pub use executor::{DocsTools, SearchHit};
