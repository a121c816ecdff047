use super::ToolDefinition;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ToolErrorHandling {
    /// Surface the failure as a tool_result block and keep going
    #[default]
    Continue,
    /// Fail the inference
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 1000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// `base * factor^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.backoff_base_ms as f64 * self.backoff_factor.powi(attempt as i32);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    pub tool_choice: ToolChoice,
    pub max_iterations: u32,
    pub execution_timeout_ms: u64,
    pub max_parallel_tools: usize,
    /// Empty means every registered tool is allowed
    pub allowed_tools: Vec<String>,
    pub tool_error_handling: ToolErrorHandling,
    pub retry: RetryConfig,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tool_choice: ToolChoice::Auto,
            max_iterations: 5,
            execution_timeout_ms: 30_000,
            max_parallel_tools: 3,
            allowed_tools: Vec::new(),
            tool_error_handling: ToolErrorHandling::Continue,
            retry: RetryConfig::default(),
        }
    }
}

impl ToolConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn is_tool_allowed(&self, name: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|t| t == name)
    }

    pub fn filter_tools(&self, tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        tools
            .into_iter()
            .filter(|t| self.is_tool_allowed(&t.name))
            .collect()
    }

    /// Whether tools should be offered to the model at all
    pub fn is_active(&self) -> bool {
        self.enabled && self.tool_choice != ToolChoice::None
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_error_handling(mut self, handling: ToolErrorHandling) -> Self {
        self.tool_error_handling = handling;
        self
    }

    pub fn with_allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CoreError::InvalidConfig(
                "tool max_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_tools == 0 {
            return Err(CoreError::InvalidConfig(
                "max_parallel_tools must be at least 1".to_string(),
            ));
        }
        if self.execution_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "tool execution timeout must be positive".to_string(),
            ));
        }
        if self.retry.backoff_factor.is_nan() || self.retry.backoff_factor < 1.0 {
            return Err(CoreError::InvalidConfig(
                "retry backoff_factor must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert!(config.is_active());
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.execution_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_parallel_tools, 3);
        assert_eq!(config.tool_error_handling, ToolErrorHandling::Continue);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_delays() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_allow_list() {
        let config = ToolConfig::default().with_allowed_tools(["echo"]);
        let tools = vec![
            ToolDefinition::new("echo", "", json!({})),
            ToolDefinition::new("shell", "", json!({})),
        ];
        let allowed = config.filter_tools(tools);
        assert_eq!(allowed.len(), 1);
        assert!(!config.is_tool_allowed("shell"));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: ToolConfig =
            serde_json::from_value(json!({"tool_choice": "none", "max_iterations": 2})).unwrap();
        assert!(!config.is_active());
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.retry.max_retries, 2);
    }
}
