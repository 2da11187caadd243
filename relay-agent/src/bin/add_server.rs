use anyhow::Result;
use relay_agent::mcp::server::ToolServer;
use relay_agent::tools::AddNumbersTool;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut server =
        ToolServer::new("add", env!("CARGO_PKG_VERSION")).with_tool(Box::new(AddNumbersTool));
    server.run().await?;
    Ok(())
}
