//! OpenAI chat-completions adapter (also serves anyscale and fireworks)

use super::http::{
    HttpEngine, HttpRequest, ProviderCodec, ProviderOutput, RequestContext, SseEvent, StreamState,
    ToolCallOutput, parse_arguments, tool_result_text,
};
use super::settings::ApiType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{BlockContent, CoreError, EventPayload, ProviderErrorKind, Result, Usage};

pub type OpenAiEngine = HttpEngine<OpenAiChatCodec>;

#[derive(Debug, Clone, Copy)]
pub struct OpenAiChatCodec {
    api_type: ApiType,
}

impl OpenAiChatCodec {
    pub fn new(api_type: ApiType) -> Self {
        Self { api_type }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<ChatUsage> for Usage {
    fn from(usage: ChatUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cached_tokens: usage.prompt_tokens_details.map_or(0, |d| d.cached_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn build_messages(request: &RequestContext<'_>) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    for block in &request.turn.blocks {
        match &block.content {
            BlockContent::System { text } => messages.push(ChatMessage::text("system", text)),
            BlockContent::User { text } => messages.push(ChatMessage::text("user", text)),
            BlockContent::LlmText { text } => messages.push(ChatMessage::text("assistant", text)),
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                tool_input,
            } => {
                let call = ChatToolCall {
                    id: tool_call_id.clone(),
                    call_type: function_type(),
                    function: ChatFunctionCall {
                        name: tool_name.clone(),
                        arguments: tool_input.to_string(),
                    },
                };
                match messages.last_mut() {
                    Some(last) if last.role == "assistant" => last.tool_calls.push(call),
                    _ => messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: None,
                        tool_calls: vec![call],
                        tool_call_id: None,
                    }),
                }
            }
            BlockContent::ToolResult {
                tool_call_id,
                result,
                error,
            } => messages.push(ChatMessage {
                role: "tool".to_string(),
                content: Some(tool_result_text(result, error.as_deref())),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id.clone()),
            }),
            BlockContent::Other { .. } => {}
        }
    }
    messages
}

impl ProviderCodec for OpenAiChatCodec {
    fn api_type(&self) -> ApiType {
        self.api_type
    }

    fn build_request(&self, request: &RequestContext<'_>) -> Result<HttpRequest> {
        let tools: Vec<ChatTool> = request
            .active_tools()
            .iter()
            .map(|t| ChatTool {
                tool_type: "function",
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();
        let tool_choice = match (tools.is_empty(), request.tool_config) {
            (false, Some(config)) => Some(config.tool_choice.to_string()),
            _ => None,
        };
        let settings = request.settings;
        let body = ChatRequest {
            model: settings.model.clone(),
            messages: build_messages(request),
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_response_tokens,
            tools,
            tool_choice,
            stream: request.stream,
            stream_options: request
                .stream
                .then(|| serde_json::json!({"include_usage": true})),
        };
        Ok(HttpRequest {
            url: format!("{}/chat/completions", request.endpoint.base_url),
            headers: vec![(
                "authorization",
                format!("Bearer {}", request.endpoint.api_key),
            )],
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ProviderOutput> {
        let response: ChatResponse = serde_json::from_value(body).map_err(|e| {
            CoreError::provider(ProviderErrorKind::Server, format!("invalid chat response: {}", e))
        })?;
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            CoreError::provider(ProviderErrorKind::Server, "chat response has no choices")
        })?;
        Ok(ProviderOutput {
            text: choice.message.content.unwrap_or_default(),
            reasoning: None,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| ToolCallOutput {
                    id: call.id,
                    name: call.function.name,
                    input: parse_arguments(&call.function.arguments),
                })
                .collect(),
            usage: response.usage.map(Usage::from),
            stop_reason: choice.finish_reason,
            item_id: response.id,
        })
    }

    fn parse_stream_event(&self, event: &SseEvent, state: &mut StreamState) -> Result<Vec<EventPayload>> {
        if event.data.trim() == "[DONE]" {
            state.done = true;
            return Ok(Vec::new());
        }
        let chunk: ChatChunk = serde_json::from_str(&event.data).map_err(|e| {
            CoreError::provider(ProviderErrorKind::Server, format!("invalid stream chunk: {}", e))
        })?;
        if state.item_id.is_none() {
            state.item_id = chunk.id;
        }
        if let Some(usage) = chunk.usage {
            state.usage = Some(usage.into());
        }
        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                state.text.push_str(&delta);
                events.push(EventPayload::TextDelta { delta });
            }
            if let Some(delta) = choice.delta.reasoning_content.filter(|d| !d.is_empty()) {
                state.reasoning.push_str(&delta);
                events.push(EventPayload::ReasoningTextDelta { delta });
            }
            for call in choice.delta.tool_calls {
                let partial = state.tool_call_mut(&call.index.to_string());
                if let Some(id) = call.id {
                    partial.id = id;
                }
                let mut arguments_delta = String::new();
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        partial.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                        arguments_delta = arguments;
                    }
                }
                events.push(EventPayload::ToolCallDelta {
                    tool_call_id: partial.id.clone(),
                    tool_name: (!partial.name.is_empty()).then(|| partial.name.clone()),
                    arguments_delta,
                });
            }
            if let Some(reason) = choice.finish_reason {
                if !state.reasoning.is_empty() {
                    events.push(EventPayload::ReasoningTextDone {
                        text: state.reasoning.clone(),
                    });
                }
                state.stop_reason = Some(reason);
            }
        }
        Ok(events)
    }
}
