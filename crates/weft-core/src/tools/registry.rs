use super::{Tool, ToolDefinition};
use crate::error::{CoreError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Name-indexed set of callable tools
///
/// Registration is expected to happen before inference starts; lookups are read-only.
pub trait ToolRegistry: Send + Sync {
    /// Register a tool under `name`; duplicates are rejected
    fn register_tool(&self, name: &str, tool: Arc<dyn Tool>) -> Result<()>;

    fn lookup_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// Definitions sorted by name
    fn list_tools(&self) -> Vec<ToolDefinition>;

    fn count(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn register_tool(&self, name: &str, tool: Arc<dyn Tool>) -> Result<()> {
        if name.is_empty() {
            return Err(CoreError::InvalidConfig("tool name cannot be empty".to_string()));
        }
        if tool.definition().name != name {
            return Err(CoreError::InvalidConfig(format!(
                "tool registered as '{}' but defined as '{}'",
                name,
                tool.definition().name
            )));
        }
        let mut tools = self.tools.write().map_err(|e| {
            CoreError::InvalidConfig(format!("Failed to acquire write lock: {}", e))
        })?;
        if tools.contains_key(name) {
            return Err(CoreError::DuplicateTool(name.to_string()));
        }
        tools.insert(name.to_string(), tool);
        debug!(tool = name, "tool registered");
        Ok(())
    }

    fn lookup_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().ok()?.get(name).cloned()
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .map(|tools| tools.values().map(|t| t.definition().clone()).collect())
            .unwrap_or_default()
    }

    fn count(&self) -> usize {
        self.tools.read().map(|tools| tools.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for InMemoryToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryToolRegistry")
            .field("count", &self.count())
            .finish()
    }
}
