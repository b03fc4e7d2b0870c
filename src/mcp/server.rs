//! Line-delimited JSON-RPC server over stdio.
//!
//! One request is read, handled and answered before the next line is read,
//! so store operations never overlap.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::memory::{MemoryStore, Storage};

use super::messages::{
    CallToolParams, Incoming, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ServerCapabilities, ServerInfo, DEFAULT_PROTOCOL_VERSION, INVALID_PARAMS,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use super::tools::{self, ToolCall};

/// MCP server exposing the memory tools.
pub struct MemoryServer<S> {
    store: MemoryStore<S>,
    info: ServerInfo,
}

impl<S: Storage> MemoryServer<S> {
    pub fn new(store: MemoryStore<S>) -> Self {
        Self {
            store,
            info: ServerInfo::from_package(),
        }
    }

    pub fn store(&self) -> &MemoryStore<S> {
        &self.store
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve on arbitrary streams until the reader hits EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            "{} {} serving on {}",
            self.info.name,
            self.info.version,
            self.store.storage().describe()
        );

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            // Frames are bytes until parsed; bad UTF-8 is a parse error, not EOF.
            let line = trim_line_ending(&buf);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if let Some(response) = self.handle_line(line) {
                let mut frame = serde_json::to_vec(&response)?;
                frame.push(b'\n');
                writer.write_all(&frame).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one input line. Returns `None` for notifications.
    pub fn handle_line(&self, line: &[u8]) -> Option<JsonRpcResponse> {
        let incoming = match Incoming::from_bytes(line) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!("Unreadable frame: {}", e);
                let error = if matches!(e, Error::Json(_)) {
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e))
                } else {
                    JsonRpcError::from(&e)
                };
                return Some(JsonRpcResponse::failure(Value::Null, error));
            }
        };

        match incoming {
            Incoming::Notification(notif) => {
                tracing::debug!("Notification: {}", notif.method);
                None
            }
            Incoming::Request(req) => Some(self.handle_request(req)),
        }
    }

    fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!("Request {}: {}", req.id, req.method);

        let outcome = match req.method.as_str() {
            "initialize" => self.initialize(req.params.as_ref()),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(req.params.as_ref()),
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(req.id, result),
            Err(error) => JsonRpcResponse::failure(req.id, error),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or_default();

        let result = InitializeResult {
            protocol_version: params
                .protocol_version
                .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string()),
            capabilities: ServerCapabilities { tools: json!({}) },
            server_info: self.info.clone(),
        };
        tracing::info!("Client initialized (protocol {})", result.protocol_version);
        to_result(&result)
    }

    fn list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        let memories = self.store.snapshot().map_err(|e| {
            tracing::error!("Failed to read memories for tools/list: {}", e);
            JsonRpcError::from(&e)
        })?;
        to_result(&json!({ "tools": tools::definitions(&memories) }))
    }

    fn call_tool(&self, params: Option<&Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .cloned()
            .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "tools/call requires params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::new(INVALID_PARAMS, format!("Invalid tools/call params: {}", e))
                })
            })?;

        let result = ToolCall::parse(&params.name, params.arguments.as_ref())
            .and_then(|call| {
                tracing::debug!("Calling tool {}", call.name());
                call.execute(&self.store)
            })
            .map_err(|e| {
                if e.is_invalid_argument() {
                    tracing::debug!("Rejected {}: {}", params.name, e);
                } else {
                    tracing::error!("Tool {} failed: {}", params.name, e);
                }
                JsonRpcError::from(&e)
            })?;

        to_result(&result)
    }
}

fn trim_line_ending(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}

fn to_result<T: serde::Serialize>(value: &T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::from(&Error::from(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::messages::INTERNAL_ERROR;
    use crate::memory::InMemoryStorage;

    fn server() -> MemoryServer<InMemoryStorage> {
        MemoryServer::new(MemoryStore::new(InMemoryStorage::new()))
    }

    /// Feed `input` through the loop and parse each output line.
    async fn run(server: &MemoryServer<InMemoryStorage>, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn call(id: u64, name: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
        })
        .to_string()
    }

    fn text(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let server = server();
        let input = [
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"host","version":"1"}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        ]
        .join("\n");

        let responses = run(&server, &input).await;
        assert_eq!(responses.len(), 2, "notifications get no response");

        let init = &responses[0]["result"];
        assert_eq!(init["protocolVersion"], "2025-03-26");
        assert_eq!(init["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(init["serverInfo"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(init["capabilities"]["tools"].is_object());

        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_tools_list_inlines_memories() {
        let server = server();
        server.store().append("likes tea").unwrap();

        let responses = run(&server, r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).await;
        let tools = responses[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        let list = tools.iter().find(|t| t["name"] == "list_memory").unwrap();
        assert!(list["description"]
            .as_str()
            .unwrap()
            .contains("Here are your memories:\nlikes tea"));
        assert_eq!(responses[0]["id"], "a");
    }

    #[tokio::test]
    async fn test_full_tool_session() {
        let server = server();
        let input = [
            call(1, "list_memory", json!({})),
            call(2, "append_memories", json!({"text": "foo\n\nbar\nfoobar"})),
            call(3, "search_memory", json!({"query": "bar"})),
            call(4, "delete_memory", json!({"query": "foo"})),
            call(5, "delete_memory", json!({"query": "zzz"})),
            call(6, "list_memory", json!({})),
        ]
        .join("\n");

        let responses = run(&server, &input).await;
        assert_eq!(responses.len(), 6);
        assert_eq!(responses[0]["result"]["content"], json!([]));
        assert_eq!(responses[0]["result"]["structuredContent"], json!({"state": "empty"}));
        assert_eq!(text(&responses[1]), "Added 3 memories (3 total)");
        assert_eq!(text(&responses[2]), "bar\nfoobar");
        assert_eq!(text(&responses[3]), "Deleted 2 memories (1 remaining)");
        assert_eq!(text(&responses[4]), "No entries matched; nothing deleted");
        assert_eq!(text(&responses[5]), "bar");
        assert_eq!(responses[5]["result"]["isError"], false);
    }

    #[tokio::test]
    async fn test_missing_arguments_are_invalid_params() {
        let server = server();
        server.store().append("keep").unwrap();
        let writes = server.store().storage().write_count();

        let input = [
            call(1, "append_memories", json!({})),
            call(2, "search_memory", json!({})),
            call(3, "delete_memory", json!({"query": ""})),
        ]
        .join("\n");

        let responses = run(&server, &input).await;
        assert_eq!(responses[0]["error"]["code"], INVALID_PARAMS);
        assert_eq!(responses[0]["error"]["message"], "Memory's text is required");
        assert_eq!(responses[1]["error"]["message"], "query is required");
        assert_eq!(responses[2]["error"]["message"], "query is required");
        for response in &responses {
            assert!(response.get("result").is_none());
        }

        assert_eq!(server.store().storage().write_count(), writes);
        assert_eq!(server.store().snapshot().unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let server = server();
        let input = [
            call(1, "update_memory", json!({})),
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#.to_string(),
        ]
        .join("\n");

        let responses = run(&server, &input).await;
        assert_eq!(responses[0]["error"]["code"], INVALID_PARAMS);
        assert_eq!(responses[0]["error"]["message"], "Unknown tool: update_memory");
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_serving() {
        let server = server();
        let input = format!("not json\n\n{}", call(9, "list_memory", json!({})));

        let responses = run(&server, &input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 9);
    }

    #[tokio::test]
    async fn test_invalid_utf8_frame_keeps_serving() {
        let server = server();
        let mut input = vec![0xff, 0xfe, b'\n'];
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#);
        input.extend_from_slice(b"\r\n");

        let mut output = Vec::new();
        server.serve(&input[..], &mut output).await.unwrap();
        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 4);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc"), b"abc");
    }

    #[tokio::test]
    async fn test_frame_without_method_is_invalid_request() {
        let server = server();
        let responses = run(&server, r#"{"jsonrpc":"2.0","id":3}"#).await;
        assert_eq!(responses[0]["error"]["code"], crate::mcp::messages::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error() {
        let server = server();
        server.store().storage().fail_writes(true);

        let responses = run(&server, &call(1, "append_memories", json!({"text": "x"}))).await;
        assert_eq!(responses[0]["error"]["code"], INTERNAL_ERROR);
        assert!(server.store().list().unwrap().is_empty());
    }
}
