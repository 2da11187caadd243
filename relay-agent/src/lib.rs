pub mod clients;
pub mod core;
pub mod mcp;
pub mod memory;
pub mod prompts;
pub mod schema;
pub mod sse;
pub mod tools;

pub use clients::{LLMClient, LLMError, Message, MessageRole, ToolDefinition, create_llm_client};
pub use core::{AgentConfig, AgentError, AgentEvent, AgentRun, Dispatcher, ToolAgent};
pub use mcp::{MCPConfig, MCPError, MCPManager, connect_all};
pub use memory::Conversation;
pub use prompts::build_system_prompt;
pub use tools::{ToolManager, ToolTrait};
