use anyhow::Result;
use clap::Parser;
use relay_agent::mcp::server::ToolServer;
use relay_agent::tools::{DEFAULT_MEMBERS_DATABASE, MemberLookupTool};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-members-server")]
#[command(about = "MCP server exposing lookup_members over stdio", long_about = None)]
struct Args {
    #[arg(long, default_value = DEFAULT_MEMBERS_DATABASE, help = "SQLite database holding a members table")]
    database: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !args.database.exists() {
        tracing::warn!("database {} does not exist yet", args.database.display());
    }

    let mut server = ToolServer::new("members", env!("CARGO_PKG_VERSION"))
        .with_tool(Box::new(MemberLookupTool::new(args.database)));
    server.run().await?;
    Ok(())
}
