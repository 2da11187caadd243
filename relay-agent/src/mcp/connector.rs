use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::future::Future;
use std::sync::Arc;

use super::client::MCPClient;
use super::config::{MCPConfig, ServerConfig};
use super::protocol::ToolDescriptor;
use super::{MCPError, MCPManager, ToolSession};

pub struct ConnectedServer {
    pub session: Arc<dyn ToolSession>,
    pub tools: Vec<ToolDescriptor>,
}

pub async fn connect_server(id: String, config: ServerConfig) -> Result<ConnectedServer, MCPError> {
    let transport = config.transport()?;
    let client = MCPClient::connect(&id, &transport).await?;

    let tools = match client.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            if let Err(close_err) = client.close().await {
                tracing::debug!("[{id}] close after failed tools/list: {close_err}");
            }
            return Err(e);
        }
    };

    tracing::info!(
        "Server [{id}] ({}) connected with tools: {:?}",
        client.kind(),
        tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
    );

    Ok(ConnectedServer {
        session: Arc::new(client),
        tools,
    })
}

pub async fn connect_all(config: &MCPConfig) -> MCPManager {
    connect_all_with(config, connect_server).await
}

/// Starts every connection at once and registers each server as its
/// attempt settles, so on a name collision the server that finished last
/// owns the tool. Failed servers are logged and contribute nothing.
pub async fn connect_all_with<F, Fut>(config: &MCPConfig, connect: F) -> MCPManager
where
    F: Fn(String, ServerConfig) -> Fut + Send,
    Fut: Future<Output = Result<ConnectedServer, MCPError>> + Send,
{
    let total = config.servers.len();
    let mut attempts: FuturesUnordered<_> = config
        .servers
        .iter()
        .enumerate()
        .map(|(index, server)| {
            let id = server.server_id(index);
            let attempt = connect(id.clone(), server.clone());
            async move { (id, attempt.await) }
        })
        .collect();

    let mut manager = MCPManager::new();
    while let Some((id, outcome)) = attempts.next().await {
        match outcome {
            Ok(server) => manager.add_server(server.session, server.tools),
            Err(e) => tracing::error!("Error connecting to server [{id}]: {e}"),
        }
    }

    tracing::info!(
        "Successfully connected to {}/{total} servers",
        manager.server_count()
    );
    tracing::info!("Total available tools: {}", manager.registry().len());
    manager
}
