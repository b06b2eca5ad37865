pub mod health;
pub mod mcp;
pub mod rag;
