//! Stdio MCP server runtime used by the tool-server binaries.
//!
//! Reads newline-delimited JSON-RPC from the reader and writes one response
//! line per request to the writer. Notifications get no reply.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, Incoming, JsonRpcRequest,
    JsonRpcResponse, MCP_PROTOCOL_VERSION, ToolsListResult, error_codes,
};
use crate::tools::{ToolManager, ToolTrait};

pub struct ToolServer {
    info: Implementation,
    tools: ToolManager,
    initialized: bool,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            tools: ToolManager::new(),
            initialized: false,
        }
    }

    pub fn with_tool(mut self, tool: Box<dyn ToolTrait>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.list()
    }

    /// Serves stdin/stdout until the client closes stdin.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        tracing::info!(
            "[{}] serving tools: {:?}",
            self.info.name,
            self.tools.list()
        );

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match Incoming::parse(trimmed) {
                Ok(Incoming::Request(request)) => Some(self.handle_request(request).await),
                Ok(Incoming::Notification(notification)) => {
                    self.handle_notification(&notification.method);
                    None
                }
                Ok(Incoming::Response(_)) => {
                    tracing::debug!("[{}] ignoring unsolicited response", self.info.name);
                    None
                }
                Err(e) => {
                    tracing::warn!("[{}] failed to parse message: {e}", self.info.name);
                    Some(JsonRpcResponse::failure(
                        Value::Null,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {e}"),
                    ))
                }
            };

            if let Some(response) = response {
                let mut encoded = serde_json::to_string(&response)?;
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("[{}] client disconnected (EOF)", self.info.name);
        Ok(())
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" => {
                tracing::debug!("[{}] client initialized", self.info.name);
            }
            other => tracing::debug!("[{}] ignoring notification {other}", self.info.name),
        }
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        match request.method.as_str() {
            "initialize" => {
                self.initialized = true;
                let result = InitializeResult {
                    protocol_version: MCP_PROTOCOL_VERSION.to_string(),
                    capabilities: serde_json::json!({ "tools": { "listChanged": false } }),
                    server_info: self.info.clone(),
                };
                to_response(id, &result)
            }
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => {
                let result = ToolsListResult {
                    tools: self.tools.descriptors(),
                    next_cursor: None,
                };
                to_response(id, &result)
            }
            "tools/call" => {
                let params: CallToolParams =
                    match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                        Ok(params) => params,
                        Err(e) => {
                            return JsonRpcResponse::failure(
                                id,
                                error_codes::INVALID_PARAMS,
                                format!("Invalid tools/call params: {e}"),
                            );
                        }
                    };
                if !self.initialized {
                    tracing::warn!("[{}] tools/call before initialize", self.info.name);
                }
                let result = self.call_tool(params).await;
                to_response(id, &result)
            }
            other => JsonRpcResponse::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }

    async fn call_tool(&self, params: CallToolParams) -> CallToolResult {
        let Some(tool) = self.tools.get(&params.name) else {
            return CallToolResult::error(format!("Unknown tool: {}", params.name));
        };

        let arguments = if params.arguments.is_null() {
            Value::Object(Default::default())
        } else {
            params.arguments
        };

        match tool.execute(arguments).await {
            Ok(Value::String(text)) => CallToolResult::text(text),
            Ok(value) => CallToolResult::text(value.to_string()),
            Err(e) => {
                tracing::warn!("[{}] tool {} failed: {e}", self.info.name, params.name);
                CallToolResult::error(e.to_string())
            }
        }
    }
}

fn to_response<T: serde::Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(id, error_codes::INVALID_REQUEST, e.to_string()),
    }
}
