//! Anthropic messages adapter

use super::http::{
    HttpEngine, HttpRequest, ProviderCodec, ProviderOutput, RequestContext, SseEvent, StreamState,
    ToolCallOutput, tool_result_text,
};
use super::settings::ApiType;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use weft_core::{BlockContent, CoreError, EventPayload, ProviderErrorKind, Result, ToolChoice, Usage};

pub type ClaudeEngine = HttpEngine<ClaudeCodec>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCodec;

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ClaudeTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<ClaudeContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

impl From<ClaudeUsage> for Usage {
    fn from(usage: ClaudeUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cached_tokens: usage.cache_read_input_tokens,
        }
    }
}

fn push_content(messages: &mut Vec<ClaudeMessage>, role: &'static str, content: ClaudeContent) {
    match messages.last_mut() {
        Some(last) if last.role == role => last.content.push(content),
        _ => messages.push(ClaudeMessage {
            role,
            content: vec![content],
        }),
    }
}

fn build_messages(request: &RequestContext<'_>) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system = Vec::new();
    let mut messages = Vec::new();
    for block in &request.turn.blocks {
        match &block.content {
            BlockContent::System { text } => system.push(text.clone()),
            BlockContent::User { text } => {
                push_content(&mut messages, "user", ClaudeContent::Text { text: text.clone() })
            }
            BlockContent::LlmText { text } => push_content(
                &mut messages,
                "assistant",
                ClaudeContent::Text { text: text.clone() },
            ),
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                tool_input,
            } => push_content(
                &mut messages,
                "assistant",
                ClaudeContent::ToolUse {
                    id: tool_call_id.clone(),
                    name: tool_name.clone(),
                    input: tool_input.clone(),
                },
            ),
            BlockContent::ToolResult {
                tool_call_id,
                result,
                error,
            } => push_content(
                &mut messages,
                "user",
                ClaudeContent::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: tool_result_text(result, error.as_deref()),
                    is_error: error.is_some(),
                },
            ),
            BlockContent::Other { .. } => {}
        }
    }
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, messages)
}

fn server_error(message: impl Into<String>) -> CoreError {
    CoreError::provider(ProviderErrorKind::Server, message)
}

impl ProviderCodec for ClaudeCodec {
    fn api_type(&self) -> ApiType {
        ApiType::Claude
    }

    fn build_request(&self, request: &RequestContext<'_>) -> Result<HttpRequest> {
        let settings = request.settings;
        let (system, messages) = build_messages(request);
        let tools: Vec<ClaudeTool> = request
            .active_tools()
            .iter()
            .map(|t| ClaudeTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect();
        let tool_choice = match request.tool_config {
            Some(config) if !tools.is_empty() => match config.tool_choice {
                ToolChoice::Required => Some(json!({"type": "any"})),
                _ => Some(json!({"type": "auto"})),
            },
            _ => None,
        };
        let body = MessagesRequest {
            model: settings.model.clone(),
            max_tokens: settings
                .max_response_tokens
                .unwrap_or(settings.claude.max_tokens),
            system,
            messages,
            tools,
            tool_choice,
            temperature: settings.temperature,
            top_p: settings.top_p,
            stream: request.stream,
        };
        let mut headers = vec![
            ("x-api-key", request.endpoint.api_key.clone()),
            ("anthropic-version", settings.claude.api_version.clone()),
        ];
        if let Some(beta) = &settings.claude.beta {
            headers.push(("anthropic-beta", beta.clone()));
        }
        Ok(HttpRequest {
            url: format!("{}/messages", request.endpoint.base_url),
            headers,
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ProviderOutput> {
        let response: MessagesResponse = serde_json::from_value(body)
            .map_err(|e| server_error(format!("invalid messages response: {}", e)))?;
        let mut output = ProviderOutput {
            usage: response.usage.map(Usage::from),
            stop_reason: response.stop_reason,
            item_id: response.id,
            ..Default::default()
        };
        let mut texts = Vec::new();
        let mut reasoning = Vec::new();
        for content in response.content {
            match content {
                ClaudeContent::Text { text } => texts.push(text),
                ClaudeContent::ToolUse { id, name, input } => {
                    output.tool_calls.push(ToolCallOutput { id, name, input })
                }
                ClaudeContent::Thinking { thinking } => reasoning.push(thinking),
                ClaudeContent::ToolResult { .. } | ClaudeContent::Unknown => {}
            }
        }
        output.text = texts.join("");
        output.reasoning = (!reasoning.is_empty()).then(|| reasoning.join("\n"));
        Ok(output)
    }

    fn parse_stream_event(&self, event: &SseEvent, state: &mut StreamState) -> Result<Vec<EventPayload>> {
        let data: Value = serde_json::from_str(&event.data)
            .map_err(|e| server_error(format!("invalid stream event: {}", e)))?;
        let kind = event
            .event
            .clone()
            .or_else(|| data["type"].as_str().map(str::to_string))
            .unwrap_or_default();
        let index = data["index"].as_u64().unwrap_or(0).to_string();
        let mut events = Vec::new();
        match kind.as_str() {
            "message_start" => {
                state.item_id = data["message"]["id"].as_str().map(str::to_string);
                let usage = state.usage_mut();
                usage.input_tokens = data["message"]["usage"]["input_tokens"].as_u64().unwrap_or(0);
                usage.cached_tokens = data["message"]["usage"]["cache_read_input_tokens"]
                    .as_u64()
                    .unwrap_or(0);
                events.push(EventPayload::Info {
                    message: "message_start".to_string(),
                    data: None,
                });
            }
            "content_block_start" => {
                let block = &data["content_block"];
                if block["type"] == "tool_use" {
                    let call = state.tool_call_mut(&index);
                    call.id = block["id"].as_str().unwrap_or_default().to_string();
                    call.name = block["name"].as_str().unwrap_or_default().to_string();
                    events.push(EventPayload::ToolCallDelta {
                        tool_call_id: call.id.clone(),
                        tool_name: Some(call.name.clone()),
                        arguments_delta: String::new(),
                    });
                }
            }
            "content_block_delta" => {
                let delta = &data["delta"];
                match delta["type"].as_str().unwrap_or_default() {
                    "text_delta" => {
                        let text = delta["text"].as_str().unwrap_or_default().to_string();
                        state.text.push_str(&text);
                        events.push(EventPayload::TextDelta { delta: text });
                    }
                    "thinking_delta" => {
                        let text = delta["thinking"].as_str().unwrap_or_default().to_string();
                        state.reasoning.push_str(&text);
                        events.push(EventPayload::ReasoningTextDelta { delta: text });
                    }
                    "input_json_delta" => {
                        let partial = delta["partial_json"].as_str().unwrap_or_default().to_string();
                        let call = state.tool_call_mut(&index);
                        call.arguments.push_str(&partial);
                        events.push(EventPayload::ToolCallDelta {
                            tool_call_id: call.id.clone(),
                            tool_name: None,
                            arguments_delta: partial,
                        });
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                    state.stop_reason = Some(reason.to_string());
                }
                if let Some(output_tokens) = data["usage"]["output_tokens"].as_u64() {
                    state.usage_mut().output_tokens = output_tokens;
                }
            }
            "message_stop" => {
                if !state.reasoning.is_empty() {
                    events.push(EventPayload::ReasoningTextDone {
                        text: state.reasoning.clone(),
                    });
                }
                state.done = true;
            }
            "error" => {
                let message = data["error"]["message"].as_str().unwrap_or("stream error");
                return Err(server_error(message.to_string()));
            }
            _ => {}
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::Endpoint;
    use crate::providers::settings::ProviderSettings;
    use weft_core::{Block, ToolConfig, ToolDefinition, Turn};

    fn request_body(turn: &Turn, tools: &[ToolDefinition], config: Option<&ToolConfig>) -> HttpRequest {
        let settings = ProviderSettings::new(ApiType::Claude, "claude-3-5-sonnet-latest");
        let endpoint = Endpoint {
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key: "sk-ant".to_string(),
        };
        ClaudeCodec
            .build_request(&RequestContext {
                turn,
                settings: &settings,
                endpoint: &endpoint,
                tools,
                tool_config: config,
                stream: false,
            })
            .unwrap()
    }

    #[test]
    fn test_build_request_groups_roles() {
        let turn = Turn::new()
            .with_block(Block::system("persona"))
            .with_block(Block::user("hi"))
            .with_block(Block::llm_text("let me check"))
            .with_block(Block::tool_use("toolu_1", "echo", json!({"text": "hi"})))
            .with_block(Block::tool_error("toolu_1", "boom"));
        let tools = vec![ToolDefinition::new("echo", "Echo", json!({"type": "object"}))];
        let config = ToolConfig::default();
        let request = request_body(&turn, &tools, Some(&config));

        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert!(request.headers.contains(&("x-api-key", "sk-ant".to_string())));
        assert!(request.headers.contains(&("anthropic-version", "2023-06-01".to_string())));
        let body = request.body;
        assert_eq!(body["system"], "persona");
        assert_eq!(body["max_tokens"], 4096);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["is_error"], true);
        assert_eq!(messages[2]["content"][0]["content"], "Error: boom");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "auto");
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "id": "msg_1",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Calling echo."},
                {"type": "tool_use", "id": "toolu_1", "name": "echo", "input": {"text": "hi"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        });
        let output = ClaudeCodec.parse_response(body).unwrap();
        assert_eq!(output.text, "Calling echo.");
        assert_eq!(output.reasoning.as_deref(), Some("hmm"));
        assert_eq!(output.tool_calls[0].name, "echo");
        assert_eq!(output.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_stream_events() {
        let events = [
            ("message_start", json!({"message": {"id": "msg_1", "usage": {"input_tokens": 9}}})),
            ("content_block_start", json!({"index": 0, "content_block": {"type": "text", "text": ""}})),
            ("content_block_delta", json!({"index": 0, "delta": {"type": "text_delta", "text": "Hi"}})),
            ("content_block_start", json!({"index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "echo"}})),
            ("content_block_delta", json!({"index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"text\":\"hi\"}"}})),
            ("message_delta", json!({"delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 6}})),
            ("message_stop", json!({})),
        ];
        let mut state = StreamState::default();
        let mut names = Vec::new();
        for (name, data) in events {
            let event = SseEvent {
                event: Some(name.to_string()),
                data: data.to_string(),
            };
            for payload in ClaudeCodec.parse_stream_event(&event, &mut state).unwrap() {
                names.push(payload.type_name());
            }
        }
        assert!(state.done);
        assert_eq!(names, vec!["info", "text-delta", "tool-call-delta", "tool-call-delta"]);
        let output = state.into_output();
        assert_eq!(output.text, "Hi");
        assert_eq!(output.tool_calls[0].id, "toolu_1");
        assert_eq!(output.tool_calls[0].input, json!({"text": "hi"}));
        let usage = output.usage.unwrap();
        assert_eq!((usage.input_tokens, usage.output_tokens), (9, 6));
    }
}
