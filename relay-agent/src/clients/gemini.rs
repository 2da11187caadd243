use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use super::{
    LLMClient, LLMError, Message, MessageRole, ModelInfo, Part, ToolCallRequest, ToolDefinition,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(600),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    pub(crate) fn build_request(
        &self,
        history: &[Message],
        system_instruction: &str,
        tools: &[ToolDefinition],
    ) -> Value {
        let contents: Vec<Value> = history.iter().map(content_json).collect();

        let mut request = json!({ "contents": contents });
        if !system_instruction.is_empty() {
            request["systemInstruction"] = json!({ "parts": [{ "text": system_instruction }] });
        }

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools.iter().map(declaration_json).collect();
            request["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        request
    }
}

fn content_json(message: &Message) -> Value {
    let role = match message.role {
        MessageRole::Assistant => "model",
        MessageRole::User | MessageRole::Tool => "user",
    };

    let parts: Vec<Value> = message
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::ToolCall(call) => json!({
                "functionCall": { "name": call.name, "args": call.arguments }
            }),
            Part::ToolResult(result) => json!({
                "functionResponse": { "name": result.name, "response": result.response_payload() }
            }),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

/// Gemini rejects OBJECT parameters without properties, so such tools are
/// declared parameterless.
fn declaration_json(tool: &ToolDefinition) -> Value {
    let has_properties = tool
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());

    if has_properties {
        json!({
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        })
    } else {
        json!({ "name": tool.name, "description": tool.description })
    }
}

pub(crate) fn parse_response(body: &Value) -> Result<Message, LLMError> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(LLMError::ApiError(message.to_string()));
    }

    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates returned");
            LLMError::ApiError(reason.to_string())
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut message_parts = Vec::with_capacity(parts.len());
    for part in parts {
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| LLMError::ParseError("functionCall without name".to_string()))?;
            let arguments = call.get("args").cloned().unwrap_or_else(|| json!({}));
            message_parts.push(Part::ToolCall(ToolCallRequest::new(name, arguments)));
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            message_parts.push(Part::Text(text.to_string()));
        }
    }

    Ok(Message::assistant(message_parts))
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn generate(
        &self,
        history: &[Message],
        system_instruction: &str,
        tools: &[ToolDefinition],
    ) -> Result<Message, LLMError> {
        let request = self.build_request(history, system_instruction, tools);

        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        if !status.is_success() && body.get("error").is_none() {
            return Err(LLMError::ApiError(format!("HTTP {status}")));
        }

        parse_response(&body)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            provider: "gemini".to_string(),
            supports_streaming: false,
        }
    }
}
