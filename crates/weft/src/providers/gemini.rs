//! Google Gemini generateContent adapter

use super::http::{
    HttpEngine, HttpRequest, ProviderCodec, ProviderOutput, RequestContext, SseEvent, StreamState,
    new_call_id,
};
use super::settings::ApiType;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use weft_core::{BlockContent, CoreError, EventPayload, ProviderErrorKind, Result, ToolChoice, Usage};

pub type GeminiEngine = HttpEngine<GeminiCodec>;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiCodec;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
}

impl From<UsageMetadata> for Usage {
    fn from(usage: UsageMetadata) -> Self {
        Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            cached_tokens: usage.cached_content_token_count,
        }
    }
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

fn push_part(contents: &mut Vec<GeminiContent>, role: &str, part: GeminiPart) {
    match contents.last_mut() {
        Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
        _ => contents.push(GeminiContent {
            role: Some(role.to_string()),
            parts: vec![part],
        }),
    }
}

fn build_contents(request: &RequestContext<'_>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    // functionResponse needs the tool name, which tool_result blocks only carry by call id
    let names: HashMap<&str, &str> = request
        .turn
        .blocks
        .iter()
        .filter_map(|b| match &b.content {
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                ..
            } => Some((tool_call_id.as_str(), tool_name.as_str())),
            _ => None,
        })
        .collect();

    let mut system = Vec::new();
    let mut contents = Vec::new();
    for block in &request.turn.blocks {
        match &block.content {
            BlockContent::System { text } => system.push(text_part(text)),
            BlockContent::User { text } => push_part(&mut contents, "user", text_part(text)),
            BlockContent::LlmText { text } => push_part(&mut contents, "model", text_part(text)),
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                tool_input,
            } => push_part(
                &mut contents,
                "model",
                GeminiPart {
                    function_call: Some(FunctionCall {
                        id: Some(tool_call_id.clone()),
                        name: tool_name.clone(),
                        args: tool_input.clone(),
                    }),
                    ..Default::default()
                },
            ),
            BlockContent::ToolResult {
                tool_call_id,
                result,
                error,
            } => {
                let response = match error {
                    Some(error) => json!({"error": error}),
                    None => json!({"result": result}),
                };
                push_part(
                    &mut contents,
                    "user",
                    GeminiPart {
                        function_response: Some(FunctionResponse {
                            id: Some(tool_call_id.clone()),
                            name: names
                                .get(tool_call_id.as_str())
                                .map(|n| n.to_string())
                                .unwrap_or_default(),
                            response,
                        }),
                        ..Default::default()
                    },
                )
            }
            BlockContent::Other { .. } => {}
        }
    }
    let system = (!system.is_empty()).then(|| GeminiContent {
        role: None,
        parts: system,
    });
    (system, contents)
}

fn server_error(message: impl Into<String>) -> CoreError {
    CoreError::provider(ProviderErrorKind::Server, message)
}

/// Fold one response (whole or a stream chunk) into the accumulator
fn absorb(response: GenerateResponse, state: &mut StreamState) -> Vec<EventPayload> {
    let mut events = Vec::new();
    if state.item_id.is_none() {
        state.item_id = response.response_id;
    }
    if let Some(usage) = response.usage_metadata {
        state.usage = Some(usage.into());
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return events;
    };
    if let Some(reason) = candidate.finish_reason {
        state.stop_reason = Some(reason);
    }
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            let key = state.tool_calls.len().to_string();
            let id = call.id.unwrap_or_else(new_call_id);
            events.push(EventPayload::ToolCallDelta {
                tool_call_id: id.clone(),
                tool_name: Some(call.name.clone()),
                arguments_delta: call.args.to_string(),
            });
            let pending = state.tool_call_mut(&key);
            pending.id = id;
            pending.name = call.name;
            pending.input = Some(if call.args.is_null() {
                json!({})
            } else {
                call.args
            });
        } else if let Some(text) = part.text {
            if part.thought.unwrap_or(false) {
                state.reasoning.push_str(&text);
                events.push(EventPayload::ReasoningTextDelta { delta: text });
            } else {
                state.text.push_str(&text);
                events.push(EventPayload::TextDelta { delta: text });
            }
        }
    }
    events
}

impl ProviderCodec for GeminiCodec {
    fn api_type(&self) -> ApiType {
        ApiType::Gemini
    }

    fn build_request(&self, request: &RequestContext<'_>) -> Result<HttpRequest> {
        let settings = request.settings;
        let (system_instruction, contents) = build_contents(request);
        let declarations: Vec<Value> = request
            .active_tools()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        let tool_config = match request.tool_config {
            Some(config) if !declarations.is_empty() => {
                let mode = match config.tool_choice {
                    ToolChoice::Required => "ANY",
                    ToolChoice::None => "NONE",
                    ToolChoice::Auto => "AUTO",
                };
                Some(json!({"functionCallingConfig": {"mode": mode}}))
            }
            _ => None,
        };
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![json!({"functionDeclarations": declarations})]
        };
        let generation_config = GenerationConfig {
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_output_tokens: settings.max_response_tokens,
        };
        let has_generation_config = generation_config.temperature.is_some()
            || generation_config.top_p.is_some()
            || generation_config.max_output_tokens.is_some();
        let body = GenerateRequest {
            contents,
            system_instruction,
            tools,
            tool_config,
            generation_config: has_generation_config.then_some(generation_config),
        };
        let url = if request.stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                request.endpoint.base_url, settings.model
            )
        } else {
            format!("{}/models/{}:generateContent", request.endpoint.base_url, settings.model)
        };
        Ok(HttpRequest {
            url,
            headers: vec![("x-goog-api-key", request.endpoint.api_key.clone())],
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ProviderOutput> {
        let response: GenerateResponse = serde_json::from_value(body)
            .map_err(|e| server_error(format!("invalid generateContent response: {}", e)))?;
        let mut state = StreamState::default();
        absorb(response, &mut state);
        Ok(state.into_output())
    }

    fn parse_stream_event(&self, event: &SseEvent, state: &mut StreamState) -> Result<Vec<EventPayload>> {
        let data: Value = serde_json::from_str(&event.data)
            .map_err(|e| server_error(format!("invalid stream chunk: {}", e)))?;
        if let Some(error) = data.get("error") {
            let message = error["message"].as_str().unwrap_or("stream error");
            return Err(server_error(message.to_string()));
        }
        let response: GenerateResponse = serde_json::from_value(data)
            .map_err(|e| server_error(format!("invalid stream chunk: {}", e)))?;
        Ok(absorb(response, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::Endpoint;
    use crate::providers::settings::ProviderSettings;
    use weft_core::{Block, ToolConfig, ToolDefinition, Turn};

    fn build(turn: &Turn, stream: bool) -> HttpRequest {
        let mut settings = ProviderSettings::new(ApiType::Gemini, "gemini-2.0-flash");
        settings.temperature = Some(0.2);
        let endpoint = Endpoint {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: "g-key".to_string(),
        };
        let tools = vec![ToolDefinition::new("lookup", "Lookup", json!({"type": "object"}))];
        let config = ToolConfig {
            tool_choice: ToolChoice::Required,
            ..Default::default()
        };
        GeminiCodec
            .build_request(&RequestContext {
                turn,
                settings: &settings,
                endpoint: &endpoint,
                tools: &tools,
                tool_config: Some(&config),
                stream,
            })
            .unwrap()
    }

    #[test]
    fn test_build_request() {
        let turn = Turn::new()
            .with_block(Block::system("be brief"))
            .with_block(Block::user("find x"))
            .with_block(Block::tool_use("call_1", "lookup", json!({"q": "x"})))
            .with_block(Block::tool_result("call_1", json!({"found": true})));
        let request = build(&turn, false);
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(request.headers, vec![("x-goog-api-key", "g-key".to_string())]);
        let body = request.body;
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "lookup");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "lookup");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"]["found"],
            true
        );
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_stream_url() {
        let request = build(&Turn::new().with_block(Block::user("hi")), true);
        assert!(request.url.ends_with(":streamGenerateContent?alt=sse"));
    }

    #[test]
    fn test_parse_response_with_function_call() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Looking it up."},
                    {"functionCall": {"name": "lookup", "args": {"q": "x"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 7}
        });
        let output = GeminiCodec.parse_response(body).unwrap();
        assert_eq!(output.text, "Looking it up.");
        assert_eq!(output.reasoning.as_deref(), Some("thinking..."));
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].input, json!({"q": "x"}));
        assert!(output.tool_calls[0].id.starts_with("call_"));
        assert_eq!(output.stop_reason.as_deref(), Some("STOP"));
        assert_eq!(output.usage.unwrap().output_tokens, 7);
    }

    #[test]
    fn test_stream_chunks_accumulate() {
        let mut state = StreamState::default();
        for chunk in [
            json!({"candidates": [{"content": {"parts": [{"text": "Hel"}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "lo"}]}, "finishReason": "STOP"}]}),
        ] {
            let event = SseEvent {
                event: None,
                data: chunk.to_string(),
            };
            GeminiCodec.parse_stream_event(&event, &mut state).unwrap();
        }
        let output = state.into_output();
        assert_eq!(output.text, "Hello");
        assert_eq!(output.stop_reason.as_deref(), Some("STOP"));
    }
}
