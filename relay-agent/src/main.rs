use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use relay_agent::clients::{api_key_env, create_llm_client, default_model};
use relay_agent::core::{AgentConfig, AgentEvent, DEFAULT_MAX_TURNS, ToolAgent};
use relay_agent::mcp::{
    MCPManager, TransportConfig, connect_all, load_mcp_config, load_mcp_config_or_default,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-agent")]
#[command(version = "0.1.0")]
#[command(about = "LLM agent calling tools on MCP servers", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, global = true, default_value = "config.json", help = "Server configuration file")]
    config: PathBuf,

    #[arg(short, long, global = true, value_enum, default_value_t = Provider::Gemini)]
    provider: Provider,

    #[arg(short, long, global = true, help = "Model name (provider default when omitted)")]
    model: Option<String>,

    #[arg(short, long, global = true)]
    api_key: Option<String>,

    #[arg(short, long, global = true, help = "Base URL for the LLM API")]
    base_url: Option<String>,

    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_TURNS,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..),
        help = "Model calls allowed per request"
    )]
    max_turns: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Interactive chat (default)")]
    Chat,

    #[command(about = "Answer a single prompt")]
    Run {
        #[arg(long)]
        prompt: String,
    },

    #[command(about = "Show the server configuration without connecting")]
    CheckConfig,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Provider {
    Gemini,
    Openai,
}

impl Provider {
    fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Openai => "openai",
        }
    }
}

fn get_api_key(provider: Provider, flag: Option<String>) -> Result<String> {
    if let Some(key) = flag {
        return Ok(key);
    }
    let var = api_key_env(provider.as_str());
    std::env::var(var).map_err(|_| {
        anyhow::anyhow!("API key not found. Please set {var} environment variable or use --api-key flag.")
    })
}

async fn build_agent(args: &Args) -> Result<ToolAgent> {
    let provider = args.provider;
    let api_key = get_api_key(provider, args.api_key.clone())?;
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| default_model(provider.as_str()).to_string());
    let client = create_llm_client(provider.as_str(), api_key, model, args.base_url.clone())?;

    let config = load_mcp_config_or_default(&args.config).await;
    let manager = connect_all(&config).await;
    print_tools(&manager);

    let agent_config = AgentConfig {
        max_turns: args.max_turns,
        system_prompt: None,
    };
    Ok(ToolAgent::new(Arc::from(client), Arc::new(manager), agent_config)
        .with_observer(Arc::new(print_event)))
}

fn print_tools(manager: &MCPManager) {
    let entries = manager.registry().entries();
    if entries.is_empty() {
        println!("{}", "No tools available.".yellow());
        return;
    }
    println!("{}", "Available tools:".bold());
    for (tool, server) in entries {
        println!("  - {} {}", tool.green(), format!("(from {server})").dimmed());
    }
    println!();
}

fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::TurnStarted { turn, max_turns } => {
            println!("{}", format!("--- Turn {turn}/{max_turns} ---").dimmed());
        }
        AgentEvent::ToolBatch(calls) => {
            for call in calls {
                println!("{} {}({})", "Tool call:".cyan(), call.name, call.arguments);
            }
        }
        AgentEvent::ToolResult(result) => match &result.outcome {
            Ok(payload) => println!("{} {}: {payload}", "Result:".cyan(), result.name),
            Err(message) => println!("{} {}: {message}", "Error:".red(), result.name),
        },
        AgentEvent::TurnLimitReached { max_turns } => {
            println!("{}", format!("Stopped after {max_turns} turns.").yellow());
        }
        AgentEvent::FinalAnswer(_) => {}
    }
}

async fn chat(agent: &ToolAgent) -> Result<()> {
    println!("Chat started. Type 'exit' or 'quit' to end.\n");

    let mut lines = io::BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        match agent.process(input).await {
            Ok(answer) => println!("{} {answer}\n", "Agent:".green().bold()),
            Err(e) => println!("{} {e}\n", "Agent:".red().bold()),
        }
    }

    Ok(())
}

async fn check_config(path: &Path) {
    println!("Checking configuration at: {}", path.display());

    match load_mcp_config(path).await {
        Ok(config) => {
            println!("Configuration loaded successfully.");
            println!("Number of configured servers: {}", config.servers.len());

            for (index, server) in config.servers.iter().enumerate() {
                let target = match server.transport() {
                    Ok(TransportConfig::Sse { url }) => format!("sse {url}"),
                    Ok(TransportConfig::Stdio { command, args, .. }) => {
                        format!("stdio {command} {}", args.join(" "))
                    }
                    Err(e) => e.to_string().red().to_string(),
                };
                println!("  - {}: {target}", server.server_id(index));
            }
        }
        Err(e) => {
            println!("Failed to load configuration: {e}");
            println!("Using default (empty) configuration.");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match &args.command {
        Some(Commands::CheckConfig) => check_config(&args.config).await,
        Some(Commands::Run { prompt }) => {
            let agent = build_agent(&args).await?;
            let outcome = agent.process(prompt).await;
            agent.manager().shutdown().await;
            println!("{} {}", "Agent:".green().bold(), outcome?);
        }
        Some(Commands::Chat) | None => {
            let agent = build_agent(&args).await?;
            let outcome = chat(&agent).await;
            agent.manager().shutdown().await;
            outcome?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_turns_must_be_positive() {
        assert!(Args::try_parse_from(["relay-agent", "--max-turns", "0"]).is_err());
        assert!(Args::try_parse_from(["relay-agent", "--max-turns", "-2"]).is_err());

        let args = Args::try_parse_from(["relay-agent", "run", "--prompt", "hi", "--max-turns", "3"]).unwrap();
        assert_eq!(args.max_turns, 3);
        assert!(matches!(args.command, Some(Commands::Run { ref prompt }) if prompt == "hi"));
    }

    #[test]
    fn test_max_turns_defaults() {
        let args = Args::try_parse_from(["relay-agent"]).unwrap();
        assert_eq!(args.max_turns, DEFAULT_MAX_TURNS);
        assert!(args.command.is_none());
    }
}
