//! Turn and block model
//!
//! A [`Turn`] is an ordered list of [`Block`]s plus typed data and metadata maps. Blocks keep
//! their payload as a tagged [`BlockContent`] variant; the dynamic `payload` map only exists
//! on the serialized form.

use crate::error::Result;
use crate::keys::{BlockMetadata, TurnData, TurnMetadata};
use crate::types::{RunId, TurnId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

pub const PAYLOAD_KEY_TEXT: &str = "text";
pub const PAYLOAD_KEY_TOOL_NAME: &str = "tool_name";
pub const PAYLOAD_KEY_TOOL_CALL_ID: &str = "tool_call_id";
pub const PAYLOAD_KEY_TOOL_INPUT: &str = "tool_input";
pub const PAYLOAD_KEY_RESULT: &str = "result";
pub const PAYLOAD_KEY_ERROR: &str = "error";

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    System,
    User,
    LlmText,
    ToolUse,
    ToolResult,
    Other,
}

impl BlockKind {
    fn default_role(self) -> Option<&'static str> {
        match self {
            Self::System => Some(ROLE_SYSTEM),
            Self::User => Some(ROLE_USER),
            Self::LlmText | Self::ToolUse => Some(ROLE_ASSISTANT),
            Self::ToolResult => Some(ROLE_TOOL),
            Self::Other => None,
        }
    }
}

/// Kind-specific block payload
#[derive(Debug, Clone, PartialEq)]
pub enum BlockContent {
    System {
        text: String,
    },
    User {
        text: String,
    },
    LlmText {
        text: String,
    },
    ToolUse {
        tool_call_id: String,
        tool_name: String,
        tool_input: Value,
    },
    ToolResult {
        tool_call_id: String,
        result: Value,
        error: Option<String>,
    },
    Other {
        payload: Map<String, Value>,
    },
}

impl BlockContent {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::System { .. } => BlockKind::System,
            Self::User { .. } => BlockKind::User,
            Self::LlmText { .. } => BlockKind::LlmText,
            Self::ToolUse { .. } => BlockKind::ToolUse,
            Self::ToolResult { .. } => BlockKind::ToolResult,
            Self::Other { .. } => BlockKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct Block {
    pub id: String,
    pub role: Option<String>,
    pub content: BlockContent,
    pub metadata: BlockMetadata,
}

impl Block {
    pub fn new(content: BlockContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: content.kind().default_role().map(str::to_string),
            content,
            metadata: BlockMetadata::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(BlockContent::System { text: text.into() })
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(BlockContent::User { text: text.into() })
    }

    pub fn llm_text(text: impl Into<String>) -> Self {
        Self::new(BlockContent::LlmText { text: text.into() })
    }

    pub fn tool_use(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: Value,
    ) -> Self {
        Self::new(BlockContent::ToolUse {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            tool_input,
        })
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: Value) -> Self {
        Self::new(BlockContent::ToolResult {
            tool_call_id: tool_call_id.into(),
            result,
            error: None,
        })
    }

    pub fn tool_error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(BlockContent::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: Value::Null,
            error: Some(message.into()),
        })
    }

    pub fn other(payload: Map<String, Value>) -> Self {
        Self::new(BlockContent::Other { payload })
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.content.kind()
    }

    /// Text of system, user and llm_text blocks
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            BlockContent::System { text }
            | BlockContent::User { text }
            | BlockContent::LlmText { text } => Some(text),
            _ => None,
        }
    }

    pub fn text_mut(&mut self) -> Option<&mut String> {
        match &mut self.content {
            BlockContent::System { text }
            | BlockContent::User { text }
            | BlockContent::LlmText { text } => Some(text),
            _ => None,
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.content {
            BlockContent::ToolUse { tool_call_id, .. }
            | BlockContent::ToolResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Dynamic payload view using the `PAYLOAD_KEY_*` names
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        match &self.content {
            BlockContent::System { text }
            | BlockContent::User { text }
            | BlockContent::LlmText { text } => {
                payload.insert(PAYLOAD_KEY_TEXT.to_string(), Value::String(text.clone()));
            }
            BlockContent::ToolUse {
                tool_call_id,
                tool_name,
                tool_input,
            } => {
                payload.insert(
                    PAYLOAD_KEY_TOOL_CALL_ID.to_string(),
                    Value::String(tool_call_id.clone()),
                );
                payload.insert(
                    PAYLOAD_KEY_TOOL_NAME.to_string(),
                    Value::String(tool_name.clone()),
                );
                payload.insert(PAYLOAD_KEY_TOOL_INPUT.to_string(), tool_input.clone());
            }
            BlockContent::ToolResult {
                tool_call_id,
                result,
                error,
            } => {
                payload.insert(
                    PAYLOAD_KEY_TOOL_CALL_ID.to_string(),
                    Value::String(tool_call_id.clone()),
                );
                payload.insert(PAYLOAD_KEY_RESULT.to_string(), result.clone());
                if let Some(error) = error {
                    payload.insert(PAYLOAD_KEY_ERROR.to_string(), Value::String(error.clone()));
                }
            }
            BlockContent::Other { payload: other } => payload = other.clone(),
        }
        payload
    }
}

/// Serialized block shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBlock {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BlockMetadata::is_empty")]
    metadata: BlockMetadata,
}

fn take_string(payload: &mut Map<String, Value>, key: &str) -> Option<String> {
    match payload.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn require_string(payload: &mut Map<String, Value>, key: &str, kind: BlockKind) -> std::result::Result<String, String> {
    take_string(payload, key).ok_or_else(|| format!("{} block requires string payload '{}'", kind, key))
}

impl TryFrom<RawBlock> for Block {
    type Error = String;

    fn try_from(raw: RawBlock) -> std::result::Result<Self, Self::Error> {
        let mut payload = raw.payload;
        let content = match raw.kind {
            BlockKind::System => BlockContent::System {
                text: take_string(&mut payload, PAYLOAD_KEY_TEXT).unwrap_or_default(),
            },
            BlockKind::User => BlockContent::User {
                text: take_string(&mut payload, PAYLOAD_KEY_TEXT).unwrap_or_default(),
            },
            BlockKind::LlmText => BlockContent::LlmText {
                text: take_string(&mut payload, PAYLOAD_KEY_TEXT).unwrap_or_default(),
            },
            BlockKind::ToolUse => BlockContent::ToolUse {
                tool_call_id: require_string(&mut payload, PAYLOAD_KEY_TOOL_CALL_ID, raw.kind)?,
                tool_name: require_string(&mut payload, PAYLOAD_KEY_TOOL_NAME, raw.kind)?,
                tool_input: payload
                    .remove(PAYLOAD_KEY_TOOL_INPUT)
                    .unwrap_or_else(|| Value::Object(Map::new())),
            },
            BlockKind::ToolResult => BlockContent::ToolResult {
                tool_call_id: require_string(&mut payload, PAYLOAD_KEY_TOOL_CALL_ID, raw.kind)?,
                result: payload.remove(PAYLOAD_KEY_RESULT).unwrap_or(Value::Null),
                error: take_string(&mut payload, PAYLOAD_KEY_ERROR),
            },
            BlockKind::Other => BlockContent::Other { payload },
        };
        let id = if raw.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            raw.id
        };
        Ok(Block {
            id,
            role: raw.role,
            content,
            metadata: raw.metadata,
        })
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        RawBlock {
            kind: block.kind(),
            payload: block.payload(),
            id: block.id,
            role: block.role,
            metadata: block.metadata,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub id: TurnId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "TurnData::is_empty")]
    pub data: TurnData,
    #[serde(default, skip_serializing_if = "TurnMetadata::is_empty")]
    pub metadata: TurnMetadata,
}

impl Turn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn append_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks_of(&self, kind: BlockKind) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.kind() == kind)
    }

    pub fn count_by_kind(&self) -> BTreeMap<BlockKind, usize> {
        let mut counts = BTreeMap::new();
        for block in &self.blocks {
            *counts.entry(block.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Contiguous `tool_use` blocks at the tail of the turn
    pub fn trailing_tool_uses(&self) -> &[Block] {
        let start = self
            .blocks
            .iter()
            .rposition(|b| b.kind() != BlockKind::ToolUse)
            .map_or(0, |i| i + 1);
        &self.blocks[start..]
    }

    /// True when the turn ends with tool calls that have not been answered yet
    pub fn has_pending_tool_round(&self) -> bool {
        !self.trailing_tool_uses().is_empty()
    }

    /// Fill in default roles for blocks that have none
    pub fn normalize(&mut self) {
        for block in &mut self.blocks {
            if block.role.is_none() {
                block.role = block.kind().default_role().map(str::to_string);
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut turn: Turn = serde_yaml::from_str(text)?;
        turn.normalize();
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use serde_json::json;

    fn sample_turn() -> Turn {
        let mut assistant = Block::llm_text("hello there");
        assistant.metadata.set(&keys::MIDDLEWARE, "logging").unwrap();
        let mut turn = Turn::new()
            .with_block(Block::system("be brief"))
            .with_block(Block::user("hi"))
            .with_block(Block::tool_use("call_1", "echo", json!({"text": "hi"})))
            .with_block(Block::tool_result("call_1", json!("hi")))
            .with_block(assistant);
        turn.metadata.set(&keys::MODEL, "gpt-4o").unwrap();
        turn
    }

    #[test]
    fn test_yaml_round_trip() {
        let turn = sample_turn();
        let yaml = turn.to_yaml().unwrap();
        let back = Turn::from_yaml(&yaml).unwrap();

        assert_eq!(back, turn);
        let kinds: Vec<_> = back.blocks.iter().map(Block::kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::System,
                BlockKind::User,
                BlockKind::ToolUse,
                BlockKind::ToolResult,
                BlockKind::LlmText
            ]
        );
        assert_eq!(back.blocks[4].text(), Some("hello there"));
        assert_eq!(
            back.blocks[4].metadata.get(&keys::MIDDLEWARE).unwrap().as_deref(),
            Some("logging")
        );
    }

    #[test]
    fn test_yaml_without_roles_is_normalized() {
        let yaml = r#"
blocks:
  - kind: user
    payload:
      text: question
  - kind: llm_text
    payload:
      text: answer
"#;
        let turn = Turn::from_yaml(yaml).unwrap();
        assert_eq!(turn.blocks[0].role.as_deref(), Some(ROLE_USER));
        assert_eq!(turn.blocks[1].role.as_deref(), Some(ROLE_ASSISTANT));
    }

    #[test]
    fn test_tool_use_requires_call_id() {
        let yaml = r#"
blocks:
  - kind: tool_use
    payload:
      tool_name: echo
"#;
        assert!(Turn::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_trailing_tool_uses() {
        let turn = Turn::new()
            .with_block(Block::user("q"))
            .with_block(Block::llm_text("thinking"))
            .with_block(Block::tool_use("a", "echo", json!({})))
            .with_block(Block::tool_use("b", "echo", json!({})));
        let pending = turn.trailing_tool_uses();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].tool_call_id(), Some("a"));
        assert!(turn.has_pending_tool_round());

        let done = turn.clone().with_block(Block::tool_result("a", json!(1)));
        assert!(!done.has_pending_tool_round());
    }

    #[test]
    fn test_payload_view() {
        let block = Block::tool_error("c1", "boom");
        let payload = block.payload();
        assert_eq!(payload[PAYLOAD_KEY_TOOL_CALL_ID], json!("c1"));
        assert_eq!(payload[PAYLOAD_KEY_ERROR], json!("boom"));
        assert_eq!(payload[PAYLOAD_KEY_RESULT], Value::Null);
    }

    #[test]
    fn test_count_by_kind() {
        let counts = sample_turn().count_by_kind();
        assert_eq!(counts[&BlockKind::ToolUse], 1);
        assert_eq!(counts.get(&BlockKind::Other), None);
    }
}
