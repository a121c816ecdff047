//! Inference events and sinks

use crate::turn::Turn;
use crate::types::TurnId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Token accounting reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub id: uuid::Uuid,
    pub turn_id: Option<TurnId>,
    pub engine: Option<String>,
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventPayload {
    Info {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    TextDelta {
        delta: String,
    },
    ReasoningTextDelta {
        delta: String,
    },
    ReasoningTextDone {
        text: String,
    },
    ToolCallDelta {
        tool_call_id: String,
        tool_name: Option<String>,
        arguments_delta: String,
    },
    ToolCallExecute {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        result: Value,
        error: Option<String>,
    },
    Completed {
        text: String,
        usage: Option<Usage>,
        stop_reason: Option<String>,
    },
    Error {
        message: String,
    },
}

impl EventPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::TextDelta { .. } => "text-delta",
            Self::ReasoningTextDelta { .. } => "reasoning-text-delta",
            Self::ReasoningTextDone { .. } => "reasoning-text-done",
            Self::ToolCallDelta { .. } => "tool-call-delta",
            Self::ToolCallExecute { .. } => "tool-call-execute",
            Self::ToolResult { .. } => "tool-result",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub metadata: EventMetadata,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            metadata: EventMetadata {
                id: uuid::Uuid::new_v4(),
                turn_id: None,
                engine: None,
                model: None,
                timestamp: Utc::now(),
            },
            payload,
        }
    }

    pub fn for_turn(turn: &Turn, payload: EventPayload) -> Self {
        let mut event = Self::new(payload);
        event.metadata.turn_id = Some(turn.id.clone());
        event
    }

    pub fn with_engine(mut self, engine: impl Into<String>, model: impl Into<String>) -> Self {
        self.metadata.engine = Some(engine.into());
        self.metadata.model = Some(model.into());
        self
    }
}

/// Receiver of inference events
pub trait EventSink: Send + Sync {
    fn publish_event(&self, event: &Event);
}

/// Keeps every published event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.payload.type_name())
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn publish_event(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish_event(&self, event: &Event) {
        let turn_id = event
            .metadata
            .turn_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        match &event.payload {
            EventPayload::TextDelta { delta } | EventPayload::ReasoningTextDelta { delta } => {
                debug!(turn_id = %turn_id, kind = event.payload.type_name(), "{}", delta)
            }
            EventPayload::Error { message } => {
                warn!(turn_id = %turn_id, "inference error: {}", message)
            }
            EventPayload::Completed { stop_reason, .. } => {
                info!(turn_id = %turn_id, stop_reason = ?stop_reason, "inference completed")
            }
            other => debug!(turn_id = %turn_id, kind = other.type_name(), "event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.publish_event(&Event::new(EventPayload::TextDelta {
            delta: "he".into(),
        }));
        sink.publish_event(&Event::new(EventPayload::Completed {
            text: "hello".into(),
            usage: None,
            stop_reason: Some("stop".into()),
        }));
        assert_eq!(sink.type_names(), vec!["text-delta", "completed"]);
    }

    #[test]
    fn test_payload_wire_tag() {
        let json = serde_json::to_value(EventPayload::ReasoningTextDone {
            text: "done".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "reasoning-text-done");
    }
}
