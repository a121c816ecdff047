//! Tool definitions, registry and the tool-loop middleware

pub mod config;
pub mod definition;
pub mod middleware;
pub mod registry;
pub mod schema;

pub use config::{RetryConfig, ToolChoice, ToolConfig, ToolErrorHandling};
pub use definition::{FnTool, Tool, ToolCallError, ToolExample, ToolDefinition};
pub use middleware::{PendingToolCall, ToolMiddleware, pending_tool_calls};
pub use registry::{InMemoryToolRegistry, ToolRegistry};
