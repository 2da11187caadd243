use std::sync::Arc;
use thiserror::Error;

use crate::clients::{LLMClient, LLMError, Message, ToolCallRequest, ToolCallResult, ToolDefinition};
use crate::mcp::MCPManager;
use crate::memory::Conversation;
use crate::prompts::build_system_prompt;

mod dispatcher;

pub use dispatcher::Dispatcher;

pub const DEFAULT_MAX_TURNS: usize = 5;

// Answer for a final reply that carries no text.
pub const EMPTY_ANSWER: &str = "Task completed.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Model(#[from] LLMError),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_turns: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TurnStarted { turn: usize, max_turns: usize },
    ToolBatch(Vec<ToolCallRequest>),
    ToolResult(ToolCallResult),
    FinalAnswer(String),
    TurnLimitReached { max_turns: usize },
}

pub type AgentObserver = Arc<dyn Fn(AgentEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AgentRun {
    pub answer: String,
    pub turns_used: usize,
    pub hit_turn_limit: bool,
    pub conversation: Conversation,
}

pub struct ToolAgent {
    client: Arc<dyn LLMClient>,
    manager: Arc<MCPManager>,
    dispatcher: Dispatcher,
    config: AgentConfig,
    tools: Vec<ToolDefinition>,
    system_instruction: String,
    observer: Option<AgentObserver>,
}

impl ToolAgent {
    pub fn new(client: Arc<dyn LLMClient>, manager: Arc<MCPManager>, config: AgentConfig) -> Self {
        let tools = manager.registry().definitions();
        let system_instruction = build_system_prompt(
            &manager.registry().names(),
            config.max_turns,
            config.system_prompt.as_deref(),
        );

        Self {
            client,
            dispatcher: Dispatcher::new(Arc::clone(&manager)),
            manager,
            config,
            tools,
            system_instruction,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: AgentObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn manager(&self) -> &MCPManager {
        &self.manager
    }

    pub fn max_turns(&self) -> usize {
        self.config.max_turns
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub async fn process(&self, prompt: &str) -> Result<String, AgentError> {
        Ok(self.run(prompt).await?.answer)
    }

    pub async fn run(&self, prompt: &str) -> Result<AgentRun, AgentError> {
        let mut conversation = Conversation::new();
        conversation.push(Message::user(prompt));

        let max_turns = self.config.max_turns;
        for turn in 1..=max_turns {
            tracing::info!("=== Turn {turn}/{max_turns} ===");
            self.notify(AgentEvent::TurnStarted { turn, max_turns });

            let response = self
                .client
                .generate(conversation.turns(), &self.system_instruction, &self.tools)
                .await?;

            let calls: Vec<ToolCallRequest> = response.tool_calls().into_iter().cloned().collect();
            let text = response.text();
            conversation.push(response);

            if calls.is_empty() {
                let text = if text.is_empty() { EMPTY_ANSWER.to_string() } else { text };
                self.notify(AgentEvent::FinalAnswer(text.clone()));
                return Ok(AgentRun {
                    answer: text,
                    turns_used: turn,
                    hit_turn_limit: false,
                    conversation,
                });
            }

            tracing::info!(
                "Model requested {} tool call(s): {:?}",
                calls.len(),
                calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
            );
            self.notify(AgentEvent::ToolBatch(calls.clone()));

            let results = self.dispatcher.dispatch(&calls).await;
            for result in &results {
                self.notify(AgentEvent::ToolResult(result.clone()));
            }
            conversation.push(Message::tool_results(results));
        }

        tracing::warn!("Reached the limit of {max_turns} turns without a final answer");
        self.notify(AgentEvent::TurnLimitReached { max_turns });

        Ok(AgentRun {
            answer: conversation.last_assistant_text(),
            turns_used: max_turns,
            hit_turn_limit: true,
            conversation,
        })
    }

    fn notify(&self, event: AgentEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}
