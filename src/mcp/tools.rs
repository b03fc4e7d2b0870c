//! Memory tools: declarations, argument validation and dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::memory::store::{QUERY_REQUIRED, TEXT_REQUIRED};
use crate::memory::codec;
use crate::memory::{MemoryEntry, MemoryStore, Storage};

use super::messages::CallToolResult;

pub const APPEND_MEMORIES: &str = "append_memories";
pub const SEARCH_MEMORY: &str = "search_memory";
pub const DELETE_MEMORY: &str = "delete_memory";
pub const LIST_MEMORY: &str = "list_memory";

/// Tool declaration as sent in `tools/list`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

fn string_arg_schema(field: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: { "type": "string" } },
        "required": [field],
    })
}

/// The four memory tools. `memories` is the current snapshot and is
/// inlined into the `list_memory` description when non-empty.
pub fn definitions(memories: &str) -> Vec<ToolDefinition> {
    let mut list_description = "Newline delimited list of all memory entries".to_string();
    if !memories.is_empty() {
        list_description.push_str(". Here are your memories:\n");
        list_description.push_str(memories);
    }

    vec![
        ToolDefinition {
            name: APPEND_MEMORIES.to_string(),
            description: "Add new memory line(s), use newline to separate".to_string(),
            input_schema: string_arg_schema("text"),
        },
        ToolDefinition {
            name: SEARCH_MEMORY.to_string(),
            description: "Return memory entries containing the query (case-sensitive)"
                .to_string(),
            input_schema: string_arg_schema("query"),
        },
        ToolDefinition {
            name: DELETE_MEMORY.to_string(),
            description: "Delete every memory entry containing the query (case-sensitive)"
                .to_string(),
            input_schema: string_arg_schema("query"),
        },
        ToolDefinition {
            name: LIST_MEMORY.to_string(),
            description: list_description,
            input_schema: json!({ "type": "object" }),
        },
    ]
}

/// Arguments for `append_memories`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendArgs {
    pub text: String,
}

/// Arguments for `search_memory` and `delete_memory`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub query: String,
}

#[derive(Deserialize, Default)]
struct RawArgs {
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    query: Option<Value>,
}

impl RawArgs {
    fn parse(arguments: Option<&Value>) -> Self {
        // Non-object arguments carry no fields; validation reports what is missing.
        arguments
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// A required argument must be a non-blank string.
fn required_string(value: Option<Value>, message: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(Error::InvalidArgument(message.to_string())),
    }
}

impl AppendArgs {
    pub fn from_arguments(arguments: Option<&Value>) -> Result<Self> {
        let raw = RawArgs::parse(arguments);
        Ok(Self {
            text: required_string(raw.text, TEXT_REQUIRED)?,
        })
    }
}

impl QueryArgs {
    pub fn from_arguments(arguments: Option<&Value>) -> Result<Self> {
        let raw = RawArgs::parse(arguments);
        Ok(Self {
            query: required_string(raw.query, QUERY_REQUIRED)?,
        })
    }
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Append(AppendArgs),
    List,
    Search(QueryArgs),
    Delete(QueryArgs),
}

impl ToolCall {
    /// Validate a `tools/call` before it reaches the store.
    pub fn parse(name: &str, arguments: Option<&Value>) -> Result<Self> {
        match name {
            APPEND_MEMORIES => Ok(ToolCall::Append(AppendArgs::from_arguments(arguments)?)),
            LIST_MEMORY => Ok(ToolCall::List),
            SEARCH_MEMORY => Ok(ToolCall::Search(QueryArgs::from_arguments(arguments)?)),
            DELETE_MEMORY => Ok(ToolCall::Delete(QueryArgs::from_arguments(arguments)?)),
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Append(_) => APPEND_MEMORIES,
            ToolCall::List => LIST_MEMORY,
            ToolCall::Search(_) => SEARCH_MEMORY,
            ToolCall::Delete(_) => DELETE_MEMORY,
        }
    }

    /// Run against the store and render the text result.
    ///
    /// List and search text carries only entry lines. When nothing is found
    /// the result has no content blocks, so an empty outcome can never read
    /// like a stored entry. Every result also carries the outcome as
    /// `structuredContent`.
    pub fn execute<S: Storage>(&self, store: &MemoryStore<S>) -> Result<CallToolResult> {
        let result = match self {
            ToolCall::Append(args) => {
                let outcome = store.append(&args.text)?;
                CallToolResult::text(outcome.to_string())
                    .with_structured(serde_json::to_value(&outcome)?)
            }
            ToolCall::List => {
                let listing = store.list()?;
                entries_result(listing.entries())
                    .with_structured(serde_json::to_value(&listing)?)
            }
            ToolCall::Search(args) => {
                let hits = store.search(&args.query)?;
                entries_result(&hits.entries).with_structured(serde_json::to_value(&hits)?)
            }
            ToolCall::Delete(args) => {
                let outcome = store.delete(&args.query)?;
                CallToolResult::text(outcome.to_string())
                    .with_structured(serde_json::to_value(&outcome)?)
            }
        };
        Ok(result)
    }
}

fn entries_result(entries: &[MemoryEntry]) -> CallToolResult {
    if entries.is_empty() {
        CallToolResult::empty()
    } else {
        CallToolResult::text(codec::join(entries))
    }
}
