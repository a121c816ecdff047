//! # weft-core
//!
//! Turn model, engine trait, middleware chain and tool loop shared by every weft crate.

pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod keys;
pub mod middleware;
pub mod tools;
pub mod turn;
pub mod types;

pub use context::InferenceContext;
pub use engine::{BoxedEngine, Engine, EngineExt, EngineMetadata, FnEngine, SharedEngine, ToolConfigurable};
pub use error::{CoreError, ErrorKind, ProviderErrorKind, Result};
pub use events::{CollectingSink, Event, EventPayload, EventSink, TracingSink, Usage};
pub use keys::{BlockMetaKey, BlockMetadata, DataKey, TurnData, TurnMetaKey, TurnMetadata};
pub use middleware::{LoggingMiddleware, Middleware, SharedMiddleware, TextTransformMiddleware, chain};
pub use tools::{
    FnTool, InMemoryToolRegistry, RetryConfig, Tool, ToolCallError, ToolChoice, ToolConfig,
    ToolDefinition, ToolErrorHandling, ToolMiddleware, ToolRegistry,
};
pub use turn::{Block, BlockContent, BlockKind, Turn};
pub use types::{RunId, TurnId};
