//! Engine trait
//!
//! An engine runs one inference over a [`Turn`] and returns it with the newly produced
//! blocks appended. Provider adapters, middleware wrappers and test fakes all implement it.

use crate::context::InferenceContext;
use crate::error::Result;
use crate::tools::{ToolConfig, ToolDefinition};
use crate::turn::Turn;
use crate::middleware::Middleware;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Engine: Send + Sync {
    /// Run inference and return the turn with new blocks appended
    async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> Result<Turn>;

    fn metadata(&self) -> EngineMetadata {
        EngineMetadata::default()
    }

    /// Tool declaration capability, if the engine supports tool calling
    fn tool_support(&self) -> Option<&dyn ToolConfigurable> {
        None
    }
}

/// Optional capability: declare tools for the next inference
pub trait ToolConfigurable: Send + Sync {
    fn configure_tools(&self, definitions: &[ToolDefinition], config: &ToolConfig);
}

#[derive(Debug, Clone, Default)]
pub struct EngineMetadata {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub capabilities: Vec<String>,
}

pub type BoxedEngine = Box<dyn Engine>;

pub type SharedEngine = Arc<dyn Engine>;

#[async_trait]
impl<E: Engine + ?Sized> Engine for Arc<E> {
    async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> Result<Turn> {
        (**self).run_inference(ctx, turn).await
    }

    fn metadata(&self) -> EngineMetadata {
        (**self).metadata()
    }

    fn tool_support(&self) -> Option<&dyn ToolConfigurable> {
        (**self).tool_support()
    }
}

/// Extension trait for engine composition
pub trait EngineExt: Engine {
    /// Wrap this engine with a middleware
    fn with_middleware<M>(self, middleware: M) -> SharedEngine
    where
        Self: Sized + 'static,
        M: Middleware,
    {
        middleware.wrap(Arc::new(self))
    }

    fn shared(self) -> SharedEngine
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

impl<T: Engine> EngineExt for T {}

/// Engine backed by a synchronous closure
pub struct FnEngine<F> {
    name: String,
    func: F,
}

impl<F> FnEngine<F>
where
    F: Fn(Turn) -> Result<Turn> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Engine for FnEngine<F>
where
    F: Fn(Turn) -> Result<Turn> + Send + Sync,
{
    async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> Result<Turn> {
        ctx.check()?;
        (self.func)(turn)
    }

    fn metadata(&self) -> EngineMetadata {
        EngineMetadata {
            name: Some(self.name.clone()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Block;

    fn echo_engine() -> FnEngine<impl Fn(Turn) -> Result<Turn> + Send + Sync> {
        FnEngine::new("echo", |mut turn: Turn| {
            let last = turn
                .blocks
                .iter()
                .rev()
                .find_map(|b| b.text())
                .unwrap_or_default()
                .to_string();
            turn.append_block(Block::llm_text(last));
            Ok(turn)
        })
    }

    #[tokio::test]
    async fn test_basic_engine() {
        let engine = echo_engine();
        let turn = Turn::new().with_block(Block::user("Hello, world!"));
        let turn = engine
            .run_inference(&InferenceContext::new(), turn)
            .await
            .unwrap();
        assert_eq!(turn.blocks.len(), 2);
        assert_eq!(turn.blocks[1].text(), Some("Hello, world!"));
        assert_eq!(engine.metadata().name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let engine = echo_engine().shared();
        let ctx = InferenceContext::new();
        ctx.cancel();
        let err = engine.run_inference(&ctx, Turn::new()).await.unwrap_err();
        assert!(err.is_canceled());
    }
}
