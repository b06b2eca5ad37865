pub mod protocol;
pub mod session;

pub use protocol::{is_jsonrpc_payload, JsonRpcMessage, JsonRpcResponse};
pub use session::McpSession;
