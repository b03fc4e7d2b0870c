//! Model Context Protocol surface for the memory store.
//!
//! - JSON-RPC 2.0 frames, one per line on stdin/stdout
//! - Tools: `append_memories`, `search_memory`, `delete_memory`, `list_memory`

pub mod messages;
pub mod server;
pub mod tools;

pub use messages::{CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::MemoryServer;
pub use tools::{AppendArgs, QueryArgs, ToolCall, ToolDefinition};
