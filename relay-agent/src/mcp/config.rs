use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::MCPError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    Sse {
        url: String,
    },
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

impl ServerConfig {
    pub fn stdio(id: &str, command: &str, args: &[&str]) -> Self {
        Self {
            id: Some(id.to_string()),
            command: Some(command.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn sse(id: &str, url: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// `id`, then `name`, then a positional fallback.
    pub fn server_id(&self, index: usize) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("server_{index}"))
    }

    /// A `url` wins over a `command` when both are present.
    pub fn transport(&self) -> Result<TransportConfig, MCPError> {
        if let Some(url) = &self.url {
            return Ok(TransportConfig::Sse { url: url.clone() });
        }

        match &self.command {
            Some(command) => Ok(TransportConfig::Stdio {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            }),
            None => Err(MCPError::InvalidConfig(
                "server entry needs either `url` or `command`".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MCPConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed configuration in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub async fn load_mcp_config(config_path: &Path) -> Result<MCPConfig, ConfigError> {
    let content = tokio::fs::read_to_string(config_path)
        .await
        .map_err(|source| ConfigError::Read {
            path: config_path.display().to_string(),
            source,
        })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: config_path.display().to_string(),
        source,
    })
}

/// Loads the configuration, degrading to an empty server list on any
/// read or parse failure.
pub async fn load_mcp_config_or_default(config_path: &Path) -> MCPConfig {
    match load_mcp_config(config_path).await {
        Ok(config) => {
            tracing::info!(
                "Loaded {} server configuration(s) from {}",
                config.servers.len(),
                config_path.display()
            );
            config
        }
        Err(e) => {
            tracing::error!("{e}; continuing without tool servers");
            MCPConfig::default()
        }
    }
}
