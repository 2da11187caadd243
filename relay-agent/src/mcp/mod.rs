use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod client;
pub mod config;
pub mod connector;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use client::MCPClient;
pub use config::{
    ConfigError, MCPConfig, ServerConfig, TransportConfig, load_mcp_config,
    load_mcp_config_or_default,
};
pub use connector::{ConnectedServer, connect_all, connect_all_with, connect_server};
pub use protocol::{CallToolResult, ToolDescriptor};
pub use registry::ToolRegistry;
pub use transport::TransportKind;

#[derive(Debug, Error)]
pub enum MCPError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Failed to spawn server: {0}")]
    SpawnFailed(String),
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(String),
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
    #[error("Server not found: {0}")]
    ServerNotFound(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Server disconnected")]
    Disconnected,
    #[error(transparent)]
    Rpc(#[from] protocol::JsonRpcError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ToolSession: Send + Sync {
    fn server_id(&self) -> &str;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, MCPError>;

    async fn close(&self) -> Result<(), MCPError>;
}

#[derive(Default)]
pub struct MCPManager {
    sessions: Vec<Arc<dyn ToolSession>>,
    by_id: HashMap<String, Arc<dyn ToolSession>>,
    registry: ToolRegistry,
}

impl MCPManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_server(&mut self, session: Arc<dyn ToolSession>, tools: Vec<ToolDescriptor>) {
        let id = session.server_id().to_string();
        self.registry.register(&id, tools);
        self.by_id.insert(id, Arc::clone(&session));
        self.sessions.push(session);
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn server_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn server_ids(&self) -> Vec<&str> {
        self.sessions.iter().map(|s| s.server_id()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.resolve(name).is_some()
    }

    pub fn session_for(&self, tool_name: &str) -> Option<Arc<dyn ToolSession>> {
        self.registry
            .resolve(tool_name)
            .and_then(|server_id| self.by_id.get(server_id))
            .map(Arc::clone)
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<CallToolResult, MCPError> {
        let server_id = self
            .registry
            .resolve(tool_name)
            .ok_or_else(|| MCPError::ToolNotFound(tool_name.to_string()))?;

        let session = self
            .by_id
            .get(server_id)
            .ok_or_else(|| MCPError::ServerNotFound(server_id.to_string()))?;

        session.call_tool(tool_name, arguments).await
    }

    pub async fn shutdown(&self) {
        for session in &self.sessions {
            match session.close().await {
                Ok(()) => tracing::debug!("Closed server [{}]", session.server_id()),
                Err(e) => tracing::warn!("Error closing server [{}]: {e}", session.server_id()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSession {
        id: String,
        fail_close: bool,
        closes: AtomicUsize,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ToolSession for RecordingSession {
        fn server_id(&self) -> &str {
            &self.id
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<CallToolResult, MCPError> {
            Ok(CallToolResult::text(format!("{}:{name}", self.id)))
        }

        async fn close(&self) -> Result<(), MCPError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.id.clone());
            if self.fail_close {
                Err(MCPError::Disconnected)
            } else {
                Ok(())
            }
        }
    }

    fn session(id: &str, fail_close: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<RecordingSession> {
        Arc::new(RecordingSession {
            id: id.to_string(),
            fail_close,
            closes: AtomicUsize::new(0),
            log: Arc::clone(log),
        })
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn test_call_tool_routes_to_owner() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = MCPManager::new();
        manager.add_server(session("a", false, &log), vec![descriptor("one")]);
        manager.add_server(session("b", false, &log), vec![descriptor("two")]);

        let result = manager.call_tool("two", serde_json::json!({})).await.unwrap();
        assert_eq!(result.joined_text(), "b:two");
        assert!(matches!(
            manager.call_tool("three", serde_json::json!({})).await,
            Err(MCPError::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_each_once_despite_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = session("first", true, &log);
        let second = session("second", false, &log);

        let mut manager = MCPManager::new();
        manager.add_server(Arc::clone(&first) as Arc<dyn ToolSession>, vec![]);
        manager.add_server(Arc::clone(&second) as Arc<dyn ToolSession>, vec![]);
        manager.shutdown().await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(first.closes.load(Ordering::SeqCst), 1);
        assert_eq!(second.closes.load(Ordering::SeqCst), 1);
    }
}
