//! Typed keys for turn data, turn metadata and block metadata
//!
//! Every key is identified as `namespace.value@vN` and is bound to the Rust type stored
//! under it. Maps only accept typed keys, so ad-hoc string keys cannot collide with
//! declared ones.

use crate::error::{CoreError, Result};
use crate::events::Usage;
use crate::tools::{ToolConfig, ToolDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Scope marker for `Turn.data`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DataScope;

/// Scope marker for `Turn.metadata`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnMetaScope;

/// Scope marker for `Block.metadata`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockMetaScope;

/// A key bound to a map scope and a value type
pub struct TypedKey<S, T> {
    namespace: &'static str,
    value: &'static str,
    version: u16,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> TypedKey<S, T> {
    pub const fn new(namespace: &'static str, value: &'static str, version: u16) -> Self {
        Self {
            namespace,
            value,
            version,
            _marker: PhantomData,
        }
    }

    /// Canonical id, e.g. `tools.config@v1`
    pub fn id(&self) -> String {
        format!("{}.{}@v{}", self.namespace, self.value, self.version)
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }
}

impl<S, T> Clone for TypedKey<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for TypedKey<S, T> {}

impl<S, T> fmt::Debug for TypedKey<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedKey({})", self.id())
    }
}

pub type DataKey<T> = TypedKey<DataScope, T>;
pub type TurnMetaKey<T> = TypedKey<TurnMetaScope, T>;
pub type BlockMetaKey<T> = TypedKey<BlockMetaScope, T>;

/// Map of serialized values addressed by typed keys of one scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyedMap<S> {
    entries: BTreeMap<String, Value>,
    #[serde(skip)]
    _scope: PhantomData<S>,
}

pub type TurnData = KeyedMap<DataScope>;
pub type TurnMetadata = KeyedMap<TurnMetaScope>;
pub type BlockMetadata = KeyedMap<BlockMetaScope>;

impl<S> KeyedMap<S> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            _scope: PhantomData,
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &TypedKey<S, T>, value: impl Into<T>) -> Result<()> {
        let value = serde_json::to_value(value.into()).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize {}: {}", key.id(), e))
        })?;
        self.entries.insert(key.id(), value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &TypedKey<S, T>) -> Result<Option<T>> {
        match self.entries.get(&key.id()) {
            Some(value) => {
                let parsed = serde_json::from_value(value.clone()).map_err(|e| {
                    CoreError::Serialization(format!("Failed to deserialize {}: {}", key.id(), e))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    pub fn contains<T>(&self, key: &TypedKey<S, T>) -> bool {
        self.entries.contains_key(&key.id())
    }

    pub fn remove<T>(&mut self, key: &TypedKey<S, T>) -> bool {
        self.entries.remove(&key.id()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw view for logging and wire encoding
    pub fn iter_raw(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// Turn data

pub const TOOL_DEFINITIONS: DataKey<Vec<ToolDefinition>> = DataKey::new("tools", "definitions", 1);
pub const TOOL_CONFIG: DataKey<ToolConfig> = DataKey::new("tools", "config", 1);

// Turn metadata

pub const PROVIDER: TurnMetaKey<String> = TurnMetaKey::new("inference", "provider", 1);
pub const MODEL: TurnMetaKey<String> = TurnMetaKey::new("inference", "model", 1);
pub const USAGE: TurnMetaKey<Usage> = TurnMetaKey::new("inference", "usage", 1);
pub const STOP_REASON: TurnMetaKey<String> = TurnMetaKey::new("inference", "stop_reason", 1);
pub const DURATION_MS: TurnMetaKey<u64> = TurnMetaKey::new("inference", "duration_ms", 1);
pub const TOOL_LOOP_ITERATIONS: TurnMetaKey<u32> =
    TurnMetaKey::new("toolloop", "tool_loop_iterations", 1);
pub const TOOL_LOOP_TRUNCATED: TurnMetaKey<bool> =
    TurnMetaKey::new("toolloop", "tool_loop_truncated", 1);

// Block metadata

pub const MIDDLEWARE: BlockMetaKey<String> = BlockMetaKey::new("middleware", "name", 1);
pub const PROVIDER_ITEM_ID: BlockMetaKey<String> = BlockMetaKey::new("provider", "item_id", 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_format() {
        assert_eq!(TOOL_LOOP_TRUNCATED.id(), "toolloop.tool_loop_truncated@v1");
        assert_eq!(TOOL_CONFIG.namespace(), "tools");
    }

    #[test]
    fn test_typed_get_set() {
        let mut meta = TurnMetadata::new();
        meta.set(&MODEL, "gpt-4o-mini").unwrap();
        meta.set(&DURATION_MS, 42u64).unwrap();

        assert_eq!(meta.get(&MODEL).unwrap().as_deref(), Some("gpt-4o-mini"));
        assert_eq!(meta.get(&DURATION_MS).unwrap(), Some(42));
        assert_eq!(meta.get(&STOP_REASON).unwrap(), None);
        assert!(meta.remove(&MODEL));
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_mismatched_stored_value_is_an_error() {
        const AS_TEXT: TurnMetaKey<String> = TurnMetaKey::new("inference", "duration_ms", 1);
        let mut meta = TurnMetadata::new();
        meta.set(&DURATION_MS, 7u64).unwrap();
        assert!(meta.get(&AS_TEXT).is_err());
    }
}
