pub mod core;
pub mod llm;
pub mod mcp;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
