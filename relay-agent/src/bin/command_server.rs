use anyhow::Result;
use clap::Parser;
use relay_agent::mcp::server::ToolServer;
use relay_agent::tools::RunCommandTool;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-command-server")]
#[command(about = "MCP server exposing run_command over stdio", long_about = None)]
struct Args {
    #[arg(long, help = "Working directory for commands")]
    workdir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let tool = match args.workdir {
        Some(dir) => RunCommandTool::in_dir(dir),
        None => RunCommandTool::new(),
    };

    let mut server = ToolServer::new("terminal", env!("CARGO_PKG_VERSION")).with_tool(Box::new(tool));
    server.run().await?;
    Ok(())
}
