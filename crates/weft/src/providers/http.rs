//! Shared HTTP plumbing for provider adapters
//!
//! Each adapter is a [`ProviderCodec`] that maps a turn to a request body and maps responses
//! (whole or streamed) to a [`ProviderOutput`]. [`HttpEngine`] owns the HTTP client and does
//! the rest: validation, transport, event publishing and merging output into the turn.

use super::settings::{ApiType, ProviderSettings};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use weft_core::keys;
use weft_core::{
    Block, CoreError, Engine, EngineMetadata, Event, EventPayload, InferenceContext,
    ProviderErrorKind, Result, ToolConfig, ToolConfigurable, ToolDefinition, Turn, Usage,
};

/// Resolved endpoint for one provider
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
}

/// Everything a codec needs to build one request
pub struct RequestContext<'a> {
    pub turn: &'a Turn,
    pub settings: &'a ProviderSettings,
    pub endpoint: &'a Endpoint,
    pub tools: &'a [ToolDefinition],
    pub tool_config: Option<&'a ToolConfig>,
    pub stream: bool,
}

impl RequestContext<'_> {
    /// Tools to declare, honouring the tool-choice policy
    pub fn active_tools(&self) -> &[ToolDefinition] {
        match self.tool_config {
            Some(config) if !config.is_active() => &[],
            _ => self.tools,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutput {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Normalized provider response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOutput {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallOutput>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
    pub item_id: Option<String>,
}

/// Tool call being assembled from stream deltas
#[derive(Debug, Clone, Default)]
pub struct PartialToolCall {
    pub key: String,
    pub id: String,
    pub name: String,
    pub arguments: String,
    pub input: Option<Value>,
}

/// Accumulator for streamed responses
#[derive(Debug, Default)]
pub struct StreamState {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<PartialToolCall>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
    pub item_id: Option<String>,
    pub done: bool,
}

impl StreamState {
    /// Tool call addressed by a stream-local key (index or item id), created on first use
    pub fn tool_call_mut(&mut self, key: &str) -> &mut PartialToolCall {
        let pos = match self.tool_calls.iter().position(|c| c.key == key) {
            Some(pos) => pos,
            None => {
                self.tool_calls.push(PartialToolCall {
                    key: key.to_string(),
                    ..Default::default()
                });
                self.tool_calls.len() - 1
            }
        };
        &mut self.tool_calls[pos]
    }

    pub fn usage_mut(&mut self) -> &mut Usage {
        self.usage.get_or_insert_with(Usage::default)
    }

    pub fn into_output(self) -> ProviderOutput {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|call| {
                let input = call.input.unwrap_or_else(|| parse_arguments(&call.arguments));
                ToolCallOutput {
                    id: if call.id.is_empty() { new_call_id() } else { call.id },
                    name: call.name,
                    input,
                }
            })
            .collect();
        ProviderOutput {
            text: self.text,
            reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
            tool_calls,
            usage: self.usage,
            stop_reason: self.stop_reason,
            item_id: self.item_id,
        }
    }
}

/// Parse tool-call arguments; malformed JSON is kept as a string for schema validation to reject
pub fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Text sent back to a provider for a tool_result block
pub fn tool_result_text(result: &Value, error: Option<&str>) -> String {
    match (error, result) {
        (Some(error), _) => format!("Error: {}", error),
        (None, Value::String(s)) => s.clone(),
        (None, Value::Null) => String::new(),
        (None, other) => other.to_string(),
    }
}

pub trait ProviderCodec: Send + Sync + 'static {
    fn api_type(&self) -> ApiType;

    fn build_request(&self, request: &RequestContext<'_>) -> Result<HttpRequest>;

    fn parse_response(&self, body: Value) -> Result<ProviderOutput>;

    /// Fold one server-sent event into `state`, returning events to publish
    fn parse_stream_event(&self, event: &SseEvent, state: &mut StreamState) -> Result<Vec<EventPayload>>;
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl From<eventsource_stream::Event> for SseEvent {
    /// The default `message` type carries no information for the codecs
    fn from(event: eventsource_stream::Event) -> Self {
        let name = (!event.event.is_empty() && event.event != "message").then_some(event.event);
        Self {
            event: name,
            data: event.data,
        }
    }
}

/// Decode an event-stream body, folding every event through `codec` until the body closes or a
/// terminal event arrives
pub async fn decode_event_stream<C, S, B, E>(
    codec: &C,
    ctx: &InferenceContext,
    body: S,
    mut publish: impl FnMut(EventPayload),
) -> Result<ProviderOutput>
where
    C: ProviderCodec + ?Sized,
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = pin!(body.eventsource());
    let mut state = StreamState::default();
    while let Some(item) = ctx.guard(async { Ok::<_, CoreError>(events.next().await) }).await? {
        let event = SseEvent::from(item.map_err(|e| {
            CoreError::provider(ProviderErrorKind::Network, format!("event stream failed: {}", e))
        })?);
        for payload in codec.parse_stream_event(&event, &mut state)? {
            publish(payload);
        }
        if stream_finished(&event, &state) {
            break;
        }
    }
    Ok(state.into_output())
}

fn network_error(e: reqwest::Error) -> CoreError {
    let kind = match e.status() {
        Some(status) => ProviderErrorKind::from_status(status.as_u16()),
        None => ProviderErrorKind::Network,
    };
    CoreError::provider(kind, e.to_string())
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Engine that talks to an HTTP provider through a codec
pub struct HttpEngine<C> {
    codec: C,
    settings: ProviderSettings,
    endpoint: Endpoint,
    client: reqwest::Client,
    configured_tools: Mutex<Option<(Vec<ToolDefinition>, ToolConfig)>>,
}

impl<C: ProviderCodec> HttpEngine<C> {
    /// Validate settings and build the engine; no network access happens here
    pub fn new(codec: C, settings: ProviderSettings) -> Result<Self> {
        let api_type = codec.api_type();
        settings.validate_for(api_type)?;
        let endpoint = Endpoint {
            base_url: settings.base_url(api_type),
            api_key: settings
                .api_key(api_type)
                .map(str::to_string)
                .unwrap_or_default(),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| CoreError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            codec,
            settings,
            endpoint,
            client,
            configured_tools: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn resolve_tools(&self, turn: &Turn) -> Result<(Vec<ToolDefinition>, Option<ToolConfig>)> {
        let from_turn = turn.data.get(&keys::TOOL_DEFINITIONS)?;
        let config_from_turn = turn.data.get(&keys::TOOL_CONFIG)?;
        if let Some(tools) = from_turn {
            return Ok((tools, config_from_turn));
        }
        let configured = self
            .configured_tools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(match configured {
            Some((tools, config)) => (tools, Some(config)),
            None => (Vec::new(), config_from_turn),
        })
    }

    async fn send(&self, ctx: &InferenceContext, request: HttpRequest) -> Result<reqwest::Response> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        let response = ctx
            .guard(async { builder.send().await.map_err(network_error) })
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CoreError::provider(
            ProviderErrorKind::from_status(status.as_u16()),
            format!("{} returned {}: {}", self.codec.api_type(), status, truncate_body(&body)),
        ))
    }

    async fn read_stream(
        &self,
        ctx: &InferenceContext,
        turn: &Turn,
        response: reqwest::Response,
    ) -> Result<ProviderOutput> {
        decode_event_stream(&self.codec, ctx, response.bytes_stream(), |payload| {
            ctx.publish(self.event(turn, payload))
        })
        .await
    }

    fn event(&self, turn: &Turn, payload: EventPayload) -> Event {
        Event::for_turn(turn, payload)
            .with_engine(self.codec.api_type().to_string(), self.settings.model.clone())
    }

    fn apply_output(&self, turn: &mut Turn, output: ProviderOutput, elapsed: Duration) -> Result<()> {
        let provider = self.codec.api_type().to_string();
        if !output.text.is_empty() {
            let mut block = Block::llm_text(output.text.clone());
            if let Some(item_id) = &output.item_id {
                block.metadata.set(&keys::PROVIDER_ITEM_ID, item_id.as_str())?;
            }
            turn.append_block(block);
        }
        for call in &output.tool_calls {
            turn.append_block(Block::tool_use(call.id.clone(), call.name.clone(), call.input.clone()));
        }
        turn.metadata.set(&keys::PROVIDER, provider)?;
        turn.metadata.set(&keys::MODEL, self.settings.model.as_str())?;
        turn.metadata.set(&keys::DURATION_MS, elapsed.as_millis() as u64)?;
        if let Some(usage) = &output.usage {
            turn.metadata.set(&keys::USAGE, usage.clone())?;
        }
        if let Some(stop_reason) = &output.stop_reason {
            turn.metadata.set(&keys::STOP_REASON, stop_reason.as_str())?;
        }
        Ok(())
    }
}

/// A terminal event was seen before the body closed
fn stream_finished(event: &SseEvent, state: &StreamState) -> bool {
    state.done || event.data.trim() == "[DONE]"
}

#[async_trait]
impl<C: ProviderCodec> Engine for HttpEngine<C> {
    async fn run_inference(&self, ctx: &InferenceContext, mut turn: Turn) -> Result<Turn> {
        let started = Instant::now();
        let (tools, tool_config) = self.resolve_tools(&turn)?;
        let stream = self.settings.stream;
        let request = self.codec.build_request(&RequestContext {
            turn: &turn,
            settings: &self.settings,
            endpoint: &self.endpoint,
            tools: &tools,
            tool_config: tool_config.as_ref(),
            stream,
        })?;
        debug!(
            provider = %self.codec.api_type(),
            model = %self.settings.model,
            url = %request.url,
            stream,
            tools = tools.len(),
            "sending inference request"
        );

        let result: Result<ProviderOutput> = async {
            let response = self.send(ctx, request).await?;
            if stream {
                self.read_stream(ctx, &turn, response).await
            } else {
                let body: Value = ctx
                    .guard(async { response.json::<Value>().await.map_err(network_error) })
                    .await?;
                self.codec.parse_response(body)
            }
        }
        .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!(provider = %self.codec.api_type(), kind = %e.kind(), "inference failed: {}", e);
                ctx.publish(self.event(&turn, EventPayload::Error { message: e.to_string() }));
                return Err(e);
            }
        };

        if let Some(reasoning) = &output.reasoning {
            debug!(chars = reasoning.len(), "provider returned reasoning");
        }
        let completed = EventPayload::Completed {
            text: output.text.clone(),
            usage: output.usage.clone(),
            stop_reason: output.stop_reason.clone(),
        };
        self.apply_output(&mut turn, output, started.elapsed())?;
        ctx.publish(self.event(&turn, completed));
        info!(
            provider = %self.codec.api_type(),
            model = %self.settings.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inference completed"
        );
        Ok(turn)
    }

    fn metadata(&self) -> EngineMetadata {
        EngineMetadata {
            name: Some(format!("{}-engine", self.codec.api_type())),
            provider: Some(self.codec.api_type().to_string()),
            model: Some(self.settings.model.clone()),
            capabilities: vec!["tools".to_string(), "streaming".to_string()],
        }
    }

    fn tool_support(&self) -> Option<&dyn ToolConfigurable> {
        Some(self)
    }
}

impl<C: ProviderCodec> ToolConfigurable for HttpEngine<C> {
    fn configure_tools(&self, definitions: &[ToolDefinition], config: &ToolConfig) {
        *self
            .configured_tools
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some((definitions.to_vec(), config.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Collects event data as text and stops on `end`
    struct EchoCodec;

    impl ProviderCodec for EchoCodec {
        fn api_type(&self) -> ApiType {
            ApiType::OpenAi
        }

        fn build_request(&self, _request: &RequestContext<'_>) -> Result<HttpRequest> {
            unreachable!("not used by stream decoding")
        }

        fn parse_response(&self, _body: Value) -> Result<ProviderOutput> {
            unreachable!("not used by stream decoding")
        }

        fn parse_stream_event(&self, event: &SseEvent, state: &mut StreamState) -> Result<Vec<EventPayload>> {
            if event.event.as_deref() == Some("end") {
                state.done = true;
                return Ok(Vec::new());
            }
            state.text.push_str(&event.data);
            Ok(vec![EventPayload::TextDelta {
                delta: event.data.clone(),
            }])
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = std::result::Result<&'static [u8], std::io::Error>> {
        futures::stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_event_stream_line_endings_and_split_chunks() {
        let mut deltas = Vec::new();
        let body = chunks(&[
            "data: {\"a\":1}\r\rdata: b\r\r",
            ": keepalive\n\nevent: message\nda",
            "ta: c\r\n\r\nevent: end\ndata: x\n\ndata: never\n\n",
        ]);
        let output = decode_event_stream(&EchoCodec, &InferenceContext::new(), body, |payload| {
            if let EventPayload::TextDelta { delta } = payload {
                deltas.push(delta);
            }
        })
        .await
        .unwrap();

        assert_eq!(deltas, vec!["{\"a\":1}", "b", "c"]);
        assert_eq!(output.text, "{\"a\":1}bc");
    }

    #[tokio::test]
    async fn test_event_stream_transport_error_is_network() {
        let body = futures::stream::iter(vec![
            Ok(b"data: one\n\n".as_slice()),
            Err(std::io::Error::other("connection reset")),
        ]);
        let err = decode_event_stream(&EchoCodec, &InferenceContext::new(), body, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), weft_core::ErrorKind::ProviderNetwork);
    }

    #[test]
    fn test_sse_event_from_wire_event() {
        let event = SseEvent::from(eventsource_stream::Event {
            event: "message".to_string(),
            data: "x".to_string(),
            id: String::new(),
            retry: None,
        });
        assert_eq!(event.event, None);
    }

    #[test]
    fn test_stream_state_assembles_tool_calls() {
        let mut state = StreamState::default();
        {
            let call = state.tool_call_mut("0");
            call.id = "call_1".into();
            call.name = "echo".into();
            call.arguments.push_str("{\"text\":");
        }
        state.tool_call_mut("0").arguments.push_str("\"hi\"}");
        state.tool_call_mut("1").name = "noop".into();

        let output = state.into_output();
        assert_eq!(output.tool_calls.len(), 2);
        assert_eq!(output.tool_calls[0].input, json!({"text": "hi"}));
        assert_eq!(output.tool_calls[1].input, json!({}));
        assert!(output.tool_calls[1].id.starts_with("call_"));
    }

    #[test]
    fn test_tool_result_text() {
        assert_eq!(tool_result_text(&json!("hi"), None), "hi");
        assert_eq!(tool_result_text(&json!({"a": 1}), None), "{\"a\":1}");
        assert_eq!(tool_result_text(&Value::Null, Some("boom")), "Error: boom");
        assert_eq!(parse_arguments("{oops"), json!("{oops"));
    }
}
