use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::config::TransportConfig;
use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, MCP_PROTOCOL_VERSION, ToolDescriptor, ToolsListResult,
};
use super::transport::{ResponseRouter, SseTransport, StdioTransport, Transport, TransportKind};
use super::{MCPError, ToolSession};

const INIT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct MCPClient {
    id: String,
    transport: Transport,
    router: Arc<ResponseRouter>,
    next_id: AtomicU64,
    call_lock: Mutex<()>,
    closed: AtomicBool,
}

impl MCPClient {
    pub async fn connect(id: &str, config: &TransportConfig) -> Result<Self, MCPError> {
        let router = ResponseRouter::new();
        let transport = match config {
            TransportConfig::Sse { url } => {
                tracing::info!("Connecting to SSE server [{id}]: {url}");
                Transport::Sse(SseTransport::connect(id, url, Arc::clone(&router)).await?)
            }
            TransportConfig::Stdio { command, args, env } => {
                tracing::info!("Starting subprocess server [{id}]: {command} {}", args.join(" "));
                Transport::Stdio(StdioTransport::spawn(id, command, args, env, Arc::clone(&router))?)
            }
        };

        let client = Self {
            id: id.to_string(),
            transport,
            router,
            next_id: AtomicU64::new(1),
            call_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        };

        match client.initialize().await {
            Ok(init) => {
                tracing::debug!(
                    "[{id}] initialized {} {} (protocol {})",
                    init.server_info.name,
                    init.server_info.version,
                    init.protocol_version
                );
                Ok(client)
            }
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    tracing::debug!("[{id}] close after failed initialize: {close_err}");
                }
                Err(e)
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub async fn initialize(&self) -> Result<InitializeResult, MCPError> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result = self
            .request_with_timeout("initialize", Some(serde_json::to_value(&params)?), INIT_TIMEOUT)
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        if init.protocol_version != MCP_PROTOCOL_VERSION {
            tracing::warn!(
                "[{}] server speaks protocol {} (client {})",
                self.id,
                init.protocol_version,
                MCP_PROTOCOL_VERSION
            );
        }

        self.notify("notifications/initialized", None).await?;
        Ok(init)
    }

    /// Fetches the whole catalog, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, MCPError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page: ToolsListResult =
                serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, MCPError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let _serialized = self.call_lock.lock().await;
        let result = self
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Releases the transport. Later calls are no-ops.
    pub async fn close(&self) -> Result<(), MCPError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.transport.close().await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, MCPError> {
        self.request_with_timeout(method, params, REQUEST_TIMEOUT).await
    }

    async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, MCPError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        let rx = self.router.register(id).await?;

        if let Err(e) = self.transport.send(&request).await {
            self.router.forget(id).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response.into_result()?),
            Ok(Err(_)) => Err(MCPError::Disconnected),
            Err(_) => {
                self.router.forget(id).await;
                Err(MCPError::Timeout(format!("{method} on [{}]", self.id)))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), MCPError> {
        let notification = JsonRpcNotification::new(method, params);
        self.transport
            .send(&serde_json::to_string(&notification)?)
            .await
    }
}

#[async_trait]
impl ToolSession for MCPClient {
    fn server_id(&self) -> &str {
        self.id()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, MCPError> {
        MCPClient::call_tool(self, name, arguments).await
    }

    async fn close(&self) -> Result<(), MCPError> {
        MCPClient::close(self).await
    }
}
