use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::clients::{ToolCallRequest, ToolCallResult};
use crate::mcp::{CallToolResult, MCPManager};

pub struct Dispatcher {
    manager: Arc<MCPManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<MCPManager>) -> Self {
        Self { manager }
    }

    /// Issues every call at once and returns one result per request, in
    /// request order. Failures become error results; none aborts the batch.
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        join_all(calls.iter().map(|call| self.dispatch_one(call))).await
    }

    async fn dispatch_one(&self, call: &ToolCallRequest) -> ToolCallResult {
        let Some(session) = self.manager.session_for(&call.name) else {
            tracing::warn!("Tool '{}' not found in any connected server", call.name);
            return ToolCallResult::failure(
                call,
                format!("Tool '{}' not found in any connected server", call.name),
            );
        };

        tracing::info!(
            "Calling {} on [{}] with {}",
            call.name,
            session.server_id(),
            call.arguments
        );

        match session.call_tool(&call.name, call.arguments.clone()).await {
            Ok(result) if result.is_error => {
                let message = result.joined_text();
                tracing::warn!("Tool {} reported an error: {message}", call.name);
                ToolCallResult::failure(call, message)
            }
            Ok(result) => ToolCallResult::success(call, payload(&result)),
            Err(e) => {
                tracing::error!("Error calling tool {}: {e}", call.name);
                ToolCallResult::failure(call, e.to_string())
            }
        }
    }
}

fn payload(result: &CallToolResult) -> Value {
    Value::String(result.joined_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{MCPError, ToolDescriptor, ToolSession};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowEcho {
        id: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolSession for SlowEcho {
        fn server_id(&self) -> &str {
            &self.id
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, MCPError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = arguments["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            match name {
                "explode" => Err(MCPError::Timeout("tools/call".to_string())),
                "refuse" => Ok(CallToolResult::error("Database error: locked")),
                _ => Ok(CallToolResult::text(format!("{name}:{delay}"))),
            }
        }

        async fn close(&self) -> Result<(), MCPError> {
            Ok(())
        }
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<SlowEcho>) {
        let session = Arc::new(SlowEcho {
            id: "echo".to_string(),
            calls: AtomicUsize::new(0),
        });
        let mut manager = MCPManager::new();
        manager.add_server(
            Arc::clone(&session) as Arc<dyn ToolSession>,
            vec![tool("a"), tool("b"), tool("explode"), tool("refuse")],
        );
        (Dispatcher::new(Arc::new(manager)), session)
    }

    #[tokio::test]
    async fn test_results_follow_request_order() {
        let (dispatcher, _) = dispatcher();
        let calls = vec![
            ToolCallRequest::new("a", json!({"delay_ms": 40})),
            ToolCallRequest::new("b", json!({"delay_ms": 0})),
            ToolCallRequest::new("a", json!({"delay_ms": 10})),
        ];

        let results = dispatcher.dispatch(&calls).await;
        let outcomes: Vec<_> = results.iter().map(|r| r.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![Ok(json!("a:40")), Ok(json!("b:0")), Ok(json!("a:10"))]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_never_reaches_a_server() {
        let (dispatcher, session) = dispatcher();
        let calls = vec![ToolCallRequest::new("missing", json!({}))];

        let results = dispatcher.dispatch(&calls).await;
        assert_eq!(
            results[0].outcome,
            Err("Tool 'missing' not found in any connected server".to_string())
        );
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_siblings() {
        let (dispatcher, _) = dispatcher();
        let calls = vec![
            ToolCallRequest::new("explode", json!({})),
            ToolCallRequest::new("refuse", json!({})),
            ToolCallRequest::new("b", json!({})),
        ];

        let results = dispatcher.dispatch(&calls).await;
        assert!(results[0].is_error());
        assert_eq!(results[1].outcome, Err("Database error: locked".to_string()));
        assert_eq!(results[2].outcome, Ok(json!("b:0")));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (dispatcher, _) = dispatcher();
        assert!(dispatcher.dispatch(&[]).await.is_empty());
    }
}
