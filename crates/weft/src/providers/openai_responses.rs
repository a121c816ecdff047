//! OpenAI responses adapter, used for reasoning models

use super::http::{
    HttpEngine, HttpRequest, ProviderCodec, ProviderOutput, RequestContext, SseEvent, StreamState,
    ToolCallOutput, parse_arguments, tool_result_text,
};
use super::settings::ApiType;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use weft_core::{BlockContent, CoreError, EventPayload, ProviderErrorKind, Result, Usage};

pub type OpenAiResponsesEngine = HttpEngine<OpenAiResponsesCodec>;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponsesCodec;

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ReasoningParam {
    effort: String,
    summary: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputItem {
    Message {
        role: &'static str,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<ResponsesUsage> for Usage {
    fn from(usage: ResponsesUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cached_tokens: usage.input_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
        }
    }
}

/// Accepted effort levels; anything else becomes medium
fn effort_level(effort: Option<&str>) -> String {
    match effort.map(|e| e.trim().to_lowercase()).as_deref() {
        Some("low") => "low".to_string(),
        Some("high") => "high".to_string(),
        _ => "medium".to_string(),
    }
}

fn build_input(request: &RequestContext<'_>) -> Vec<InputItem> {
    let message = |role: &'static str, kind: &'static str, text: &str| InputItem::Message {
        role,
        content: vec![ContentPart {
            kind,
            text: text.to_string(),
        }],
    };
    request
        .turn
        .blocks
        .iter()
        .filter_map(|block| match &block.content {
            BlockContent::System { text } if !text.trim().is_empty() => {
                Some(message("system", "input_text", text))
            }
            BlockContent::User { text } if !text.trim().is_empty() => {
                Some(message("user", "input_text", text))
            }
            BlockContent::LlmText { text } if !text.trim().is_empty() => {
                Some(message("assistant", "output_text", text))
            }
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                tool_input,
            } => Some(InputItem::FunctionCall {
                call_id: tool_call_id.clone(),
                name: tool_name.clone(),
                arguments: tool_input.to_string(),
            }),
            BlockContent::ToolResult {
                tool_call_id,
                result,
                error,
            } => Some(InputItem::FunctionCallOutput {
                call_id: tool_call_id.clone(),
                output: tool_result_text(result, error.as_deref()),
            }),
            _ => None,
        })
        .collect()
}

fn server_error(message: impl Into<String>) -> CoreError {
    CoreError::provider(ProviderErrorKind::Server, message)
}

fn summary_text(item: &Value) -> String {
    item["summary"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

impl ProviderCodec for OpenAiResponsesCodec {
    fn api_type(&self) -> ApiType {
        ApiType::OpenAiResponses
    }

    fn build_request(&self, request: &RequestContext<'_>) -> Result<HttpRequest> {
        let settings = request.settings;
        let reasoning_model = settings.is_reasoning_model();
        let tools: Vec<Value> = request
            .active_tools()
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        let tool_choice = match (tools.is_empty(), request.tool_config) {
            (false, Some(config)) => Some(config.tool_choice.to_string()),
            _ => None,
        };
        let body = ResponsesRequest {
            model: settings.model.clone(),
            input: build_input(request),
            reasoning: reasoning_model.then(|| ReasoningParam {
                effort: effort_level(settings.reasoning_effort.as_deref()),
                summary: "auto",
            }),
            // reasoning models reject sampling parameters
            temperature: settings.temperature.filter(|_| !reasoning_model),
            top_p: settings.top_p.filter(|_| !reasoning_model),
            max_output_tokens: settings.max_response_tokens,
            tools,
            tool_choice,
            stream: request.stream,
        };
        Ok(HttpRequest {
            url: format!("{}/responses", request.endpoint.base_url),
            headers: vec![(
                "authorization",
                format!("Bearer {}", request.endpoint.api_key),
            )],
            body: serde_json::to_value(body)?,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ProviderOutput> {
        let response: ResponsesResponse = serde_json::from_value(body)
            .map_err(|e| server_error(format!("invalid responses payload: {}", e)))?;
        let mut output = ProviderOutput {
            usage: response.usage.map(Usage::from),
            stop_reason: response.status,
            item_id: response.id,
            ..Default::default()
        };
        let mut reasoning = Vec::new();
        for item in &response.output {
            match item["type"].as_str().unwrap_or_default() {
                "message" => {
                    for part in item["content"].as_array().into_iter().flatten() {
                        if matches!(part["type"].as_str(), Some("output_text" | "text")) {
                            output.text.push_str(part["text"].as_str().unwrap_or_default());
                        }
                    }
                    if let Some(id) = item["id"].as_str() {
                        output.item_id = Some(id.to_string());
                    }
                }
                "function_call" => output.tool_calls.push(ToolCallOutput {
                    id: item["call_id"].as_str().unwrap_or_default().to_string(),
                    name: item["name"].as_str().unwrap_or_default().to_string(),
                    input: parse_arguments(item["arguments"].as_str().unwrap_or_default()),
                }),
                "reasoning" => {
                    let text = summary_text(item);
                    if !text.is_empty() {
                        reasoning.push(text);
                    }
                }
                _ => {}
            }
        }
        output.reasoning = (!reasoning.is_empty()).then(|| reasoning.join("\n"));
        Ok(output)
    }

    fn parse_stream_event(&self, event: &SseEvent, state: &mut StreamState) -> Result<Vec<EventPayload>> {
        let data: Value = serde_json::from_str(&event.data)
            .map_err(|e| server_error(format!("invalid stream event: {}", e)))?;
        let kind = data["type"]
            .as_str()
            .map(str::to_string)
            .or_else(|| event.event.clone())
            .unwrap_or_default();
        let mut events = Vec::new();
        match kind.as_str() {
            "response.created" => events.push(EventPayload::Info {
                message: "response-created".to_string(),
                data: None,
            }),
            "response.output_item.added" => {
                let item = &data["item"];
                match item["type"].as_str().unwrap_or_default() {
                    "function_call" => {
                        let key = item["id"].as_str().unwrap_or_default().to_string();
                        let call = state.tool_call_mut(&key);
                        call.id = item["call_id"].as_str().unwrap_or_default().to_string();
                        call.name = item["name"].as_str().unwrap_or_default().to_string();
                        events.push(EventPayload::ToolCallDelta {
                            tool_call_id: call.id.clone(),
                            tool_name: Some(call.name.clone()),
                            arguments_delta: String::new(),
                        });
                    }
                    "reasoning" => events.push(EventPayload::Info {
                        message: "thinking-started".to_string(),
                        data: None,
                    }),
                    "message" => {
                        state.item_id = item["id"].as_str().map(str::to_string);
                    }
                    _ => {}
                }
            }
            "response.output_item.done" => {
                let item = &data["item"];
                if item["type"] == "function_call" {
                    let key = item["id"].as_str().unwrap_or_default().to_string();
                    let call = state.tool_call_mut(&key);
                    if let Some(arguments) = item["arguments"].as_str().filter(|a| !a.is_empty()) {
                        call.arguments = arguments.to_string();
                    }
                }
            }
            "response.output_text.delta" => {
                let delta = data["delta"].as_str().unwrap_or_default().to_string();
                if !delta.is_empty() {
                    state.text.push_str(&delta);
                    events.push(EventPayload::TextDelta { delta });
                }
            }
            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                let delta = data["delta"].as_str().unwrap_or_default().to_string();
                state.reasoning.push_str(&delta);
                events.push(EventPayload::ReasoningTextDelta { delta });
            }
            "response.reasoning_summary_text.done" | "response.reasoning_text.done" => {
                events.push(EventPayload::ReasoningTextDone {
                    text: data["text"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| state.reasoning.clone()),
                });
            }
            "response.function_call_arguments.delta" => {
                let key = data["item_id"].as_str().unwrap_or_default().to_string();
                let delta = data["delta"].as_str().unwrap_or_default().to_string();
                let call = state.tool_call_mut(&key);
                call.arguments.push_str(&delta);
                events.push(EventPayload::ToolCallDelta {
                    tool_call_id: call.id.clone(),
                    tool_name: None,
                    arguments_delta: delta,
                });
            }
            "response.function_call_arguments.done" => {
                let key = data["item_id"].as_str().unwrap_or_default().to_string();
                if let Some(arguments) = data["arguments"].as_str().filter(|a| !a.is_empty()) {
                    state.tool_call_mut(&key).arguments = arguments.to_string();
                }
            }
            "response.completed" | "response.incomplete" => {
                let response = &data["response"];
                if let Ok(usage) = serde_json::from_value::<ResponsesUsage>(response["usage"].clone()) {
                    state.usage = Some(usage.into());
                }
                state.stop_reason = response["status"].as_str().map(str::to_string);
                state.done = true;
            }
            "response.failed" | "error" => {
                let message = data["response"]["error"]["message"]
                    .as_str()
                    .or_else(|| data["message"].as_str())
                    .unwrap_or("response failed");
                return Err(server_error(message.to_string()));
            }
            _ => {}
        }
        Ok(events)
    }
}
