use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::{OpenAIClient, StreamChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub id: Option<String>,
    pub name: String,
    pub outcome: Result<Value, String>,
}

impl ToolCallResult {
    pub fn success(request: &ToolCallRequest, payload: Value) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            outcome: Ok(payload),
        }
    }

    pub fn failure(request: &ToolCallRequest, message: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            outcome: Err(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn response_payload(&self) -> Value {
        match &self.outcome {
            Ok(payload) => serde_json::json!({ "result": payload }),
            Err(message) => serde_json::json!({ "error": message }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self {
            role: MessageRole::Assistant,
            parts,
        }
    }

    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self {
            role: MessageRole::Tool,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub supports_streaming: bool,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(
        &self,
        history: &[Message],
        system_instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<Message, LLMError>;

    fn model_info(&self) -> ModelInfo;
}

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-001";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" | "OpenAI" => DEFAULT_OPENAI_MODEL,
        _ => DEFAULT_GEMINI_MODEL,
    }
}

pub fn api_key_env(provider: &str) -> &'static str {
    match provider {
        "openai" | "OpenAI" => "OPENAI_API_KEY",
        _ => "GEMINI_API_KEY",
    }
}

pub fn create_llm_client(
    provider: &str,
    api_key: String,
    model: String,
    base_url: Option<String>,
) -> Result<Box<dyn LLMClient>, LLMError> {
    match provider {
        "gemini" | "Gemini" => Ok(Box::new(GeminiClient::new(api_key, model, base_url))),
        "openai" | "OpenAI" => Ok(Box::new(OpenAIClient::new(api_key, model, base_url))),
        _ => Err(LLMError::ConfigError(format!("Unknown provider: {}", provider))),
    }
}
