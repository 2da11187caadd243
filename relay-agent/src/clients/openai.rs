use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use super::{
    LLMClient, LLMError, Message, MessageRole, ModelInfo, Part, ToolCallRequest, ToolDefinition,
};
use crate::sse::SseDecoder;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    ToolCall {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Done,
}

pub struct OpenAIClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(600),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub(crate) fn build_request(
        &self,
        history: &[Message],
        system_instruction: &str,
        tools: &[ToolDefinition],
    ) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_instruction.is_empty() {
            messages.push(json!({ "role": "system", "content": system_instruction }));
        }

        for message in history {
            match message.role {
                MessageRole::User => {
                    messages.push(json!({ "role": "user", "content": message.text() }));
                }
                MessageRole::Assistant => {
                    let mut map = serde_json::Map::new();
                    map.insert("role".to_string(), json!("assistant"));
                    let text = message.text();
                    map.insert(
                        "content".to_string(),
                        if text.is_empty() { Value::Null } else { json!(text) },
                    );

                    let tool_calls: Vec<Value> = message
                        .tool_calls()
                        .into_iter()
                        .enumerate()
                        .map(|(i, call)| {
                            json!({
                                "id": call_id(call.id.as_deref(), i),
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string()
                                }
                            })
                        })
                        .collect();
                    if !tool_calls.is_empty() {
                        map.insert("tool_calls".to_string(), Value::Array(tool_calls));
                    }
                    messages.push(Value::Object(map));
                }
                MessageRole::Tool => {
                    for (i, part) in message.parts.iter().enumerate() {
                        if let Part::ToolResult(result) = part {
                            messages.push(json!({
                                "role": "tool",
                                "tool_call_id": call_id(result.id.as_deref(), i),
                                "content": result.response_payload().to_string()
                            }));
                        }
                    }
                }
            }
        }

        let mut request = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        if !tools.is_empty() {
            let tools_json: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(tools_json);
        }

        request
    }
}

/// Positional ids line calls and results up when the provider gave none.
fn call_id(id: Option<&str>, index: usize) -> String {
    id.map(str::to_string)
        .unwrap_or_else(|| format!("call_{index}"))
}

fn chunks_from_delta(json: &Value) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    let Some(choices) = json.get("choices").and_then(Value::as_array) else {
        return chunks;
    };

    for choice in choices {
        let Some(delta) = choice.get("delta").or_else(|| choice.get("message")) else {
            continue;
        };

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                chunks.push(StreamChunk::Content(content.to_string()));
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (position, tc) in tool_calls.iter().enumerate() {
                let function = tc.get("function");
                chunks.push(StreamChunk::ToolCall {
                    index: tc
                        .get("index")
                        .and_then(Value::as_u64)
                        .map(|i| i as usize)
                        .unwrap_or(position),
                    id: tc.get("id").and_then(Value::as_str).map(str::to_string),
                    name: function
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    arguments: function
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
    }

    chunks
}

fn parse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<StreamChunk, LLMError>> + Send {
    async_stream::stream! {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut full_response = Vec::new();
        let mut saw_event = false;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(LLMError::RequestFailed(e.to_string()));
                    return;
                }
            };
            full_response.extend_from_slice(&bytes);

            for event in decoder.push(&bytes) {
                saw_event = true;
                if event.data.trim() == "[DONE]" {
                    yield Ok(StreamChunk::Done);
                    return;
                }
                match serde_json::from_str::<Value>(&event.data) {
                    Ok(json) => {
                        for chunk in chunks_from_delta(&json) {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => tracing::debug!("Skipping unparseable stream event: {e}"),
                }
            }
        }

        // Some compatible servers ignore `stream` and answer with one body.
        if !saw_event {
            match serde_json::from_slice::<Value>(&full_response) {
                Ok(json) => {
                    if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
                        yield Err(LLMError::ApiError(message.to_string()));
                        return;
                    }
                    for chunk in chunks_from_delta(&json) {
                        yield Ok(chunk);
                    }
                }
                Err(_) => {
                    yield Err(LLMError::ParseError(format!(
                        "Failed to parse response: {}",
                        String::from_utf8_lossy(&full_response)
                    )));
                    return;
                }
            }
        }

        yield Ok(StreamChunk::Done);
    }
}

/// Folds streamed chunks into one assistant message.
pub(crate) async fn collect_stream<S>(mut stream: Pin<Box<S>>) -> Result<Message, LLMError>
where
    S: Stream<Item = Result<StreamChunk, LLMError>> + Send + ?Sized,
{
    let mut text = String::new();
    let mut calls: BTreeMap<usize, (Option<String>, String, String)> = BTreeMap::new();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Content(content) => text.push_str(&content),
            StreamChunk::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let entry = calls.entry(index).or_default();
                if id.is_some() {
                    entry.0 = id;
                }
                if let Some(name) = name {
                    entry.1.push_str(&name);
                }
                entry.2.push_str(&arguments);
            }
            StreamChunk::Done => break,
        }
    }

    let mut parts = Vec::with_capacity(calls.len() + 1);
    if !text.is_empty() {
        parts.push(Part::Text(text));
    }
    for (id, name, arguments) in calls.into_values() {
        let arguments = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&arguments).unwrap_or_else(|e| {
                tracing::warn!("Tool call {name} has malformed arguments ({e}): {arguments}");
                json!({})
            })
        };
        parts.push(Part::ToolCall(ToolCallRequest {
            id,
            name,
            arguments,
        }));
    }

    Ok(Message::assistant(parts))
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(
        &self,
        history: &[Message],
        system_instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<Message, LLMError> {
        let request = self.build_request(history, system_instruction, tools);

        let response = self
            .client
            .post(&self.base_url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError(format!("HTTP {status}: {body}")));
        }

        collect_stream(Box::pin(parse_stream(response))).await
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "openai".to_string(),
            supports_streaming: true,
        }
    }
}
