//! Middleware chain
//!
//! A middleware wraps the next engine and returns a new one. `chain` folds an ordered list
//! around a base engine so that the first middleware in the list runs outermost.

use crate::context::InferenceContext;
use crate::engine::{Engine, EngineMetadata, SharedEngine, ToolConfigurable};
use crate::error::Result;
use crate::keys;
use crate::turn::{BlockKind, Turn};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub trait Middleware: Send + Sync {
    fn wrap(&self, next: SharedEngine) -> SharedEngine;

    fn name(&self) -> &str;
}

pub type SharedMiddleware = Arc<dyn Middleware>;

/// Compose `middlewares` around `base`; `[m1, m2]` yields `m1(m2(base))`
pub fn chain(base: SharedEngine, middlewares: &[SharedMiddleware]) -> SharedEngine {
    middlewares
        .iter()
        .rev()
        .fold(base, |next, middleware| middleware.wrap(next))
}

/// Logs block counts by kind before and after inference
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: SharedEngine) -> SharedEngine {
        Arc::new(LoggingEngine { next })
    }

    fn name(&self) -> &str {
        "logging"
    }
}

struct LoggingEngine {
    next: SharedEngine,
}

fn format_counts(counts: &BTreeMap<BlockKind, usize>) -> String {
    counts
        .iter()
        .map(|(kind, n)| format!("{}={}", kind, n))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Engine for LoggingEngine {
    async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> Result<Turn> {
        let turn_id = turn.id.clone();
        info!(
            turn_id = %turn_id,
            blocks = turn.blocks.len(),
            counts = %format_counts(&turn.count_by_kind()),
            "inference start"
        );
        match self.next.run_inference(ctx, turn).await {
            Ok(turn) => {
                let model = turn.metadata.get(&keys::MODEL).ok().flatten();
                info!(
                    turn_id = %turn_id,
                    blocks = turn.blocks.len(),
                    counts = %format_counts(&turn.count_by_kind()),
                    model = ?model,
                    "inference done"
                );
                Ok(turn)
            }
            Err(e) => {
                warn!(turn_id = %turn_id, kind = %e.kind(), "inference failed: {}", e);
                Err(e)
            }
        }
    }

    fn metadata(&self) -> EngineMetadata {
        self.next.metadata()
    }

    fn tool_support(&self) -> Option<&dyn ToolConfigurable> {
        self.next.tool_support()
    }
}

type TextTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Rewrites the text of every llm_text block in the returned turn
#[derive(Clone)]
pub struct TextTransformMiddleware {
    name: String,
    transform: TextTransform,
}

impl TextTransformMiddleware {
    pub fn new(name: impl Into<String>, transform: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    pub fn uppercase() -> Self {
        Self::new("uppercase", |text| text.to_uppercase())
    }
}

impl Middleware for TextTransformMiddleware {
    fn wrap(&self, next: SharedEngine) -> SharedEngine {
        Arc::new(TextTransformEngine {
            next,
            name: self.name.clone(),
            transform: self.transform.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct TextTransformEngine {
    next: SharedEngine,
    name: String,
    transform: TextTransform,
}

#[async_trait]
impl Engine for TextTransformEngine {
    async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> Result<Turn> {
        let mut turn = self.next.run_inference(ctx, turn).await?;
        let mut rewritten = 0usize;
        for block in turn.blocks.iter_mut().filter(|b| b.kind() == BlockKind::LlmText) {
            if let Some(text) = block.text_mut() {
                *text = (self.transform)(text);
                block.metadata.set(&keys::MIDDLEWARE, self.name.as_str())?;
                rewritten += 1;
            }
        }
        debug!(middleware = %self.name, rewritten, "text transform applied");
        Ok(turn)
    }

    fn metadata(&self) -> EngineMetadata {
        self.next.metadata()
    }

    fn tool_support(&self) -> Option<&dyn ToolConfigurable> {
        self.next.tool_support()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineExt, FnEngine};
    use crate::error::CoreError;
    use crate::turn::Block;
    use std::sync::Mutex;

    struct RecordingMiddleware {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingEngine {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        next: SharedEngine,
    }

    impl Middleware for RecordingMiddleware {
        fn wrap(&self, next: SharedEngine) -> SharedEngine {
            Arc::new(RecordingEngine {
                label: self.label,
                log: self.log.clone(),
                next,
            })
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    #[async_trait]
    impl Engine for RecordingEngine {
        async fn run_inference(&self, ctx: &InferenceContext, turn: Turn) -> Result<Turn> {
            self.log.lock().unwrap().push(format!("{}-before", self.label));
            let turn = self.next.run_inference(ctx, turn).await?;
            self.log.lock().unwrap().push(format!("{}-after", self.label));
            Ok(turn)
        }
    }

    #[tokio::test]
    async fn test_chain_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let base_log = log.clone();
        let base = FnEngine::new("base", move |turn| {
            base_log.lock().unwrap().push("base".to_string());
            Ok(turn)
        })
        .shared();
        let middlewares: Vec<SharedMiddleware> = ["m1", "m2", "m3"]
            .into_iter()
            .map(|label| {
                Arc::new(RecordingMiddleware {
                    label,
                    log: log.clone(),
                }) as SharedMiddleware
            })
            .collect();

        let engine = chain(base, &middlewares);
        engine
            .run_inference(&InferenceContext::new(), Turn::new())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "m1-before", "m2-before", "m3-before", "base", "m3-after", "m2-after",
                "m1-after"
            ]
        );
    }

    #[tokio::test]
    async fn test_uppercase_and_logging() {
        let engine = FnEngine::new("answer", |turn: Turn| Ok(turn.with_block(Block::llm_text("hello"))))
            .with_middleware(TextTransformMiddleware::uppercase())
            .with_middleware(LoggingMiddleware);

        let turn = engine
            .run_inference(&InferenceContext::new(), Turn::new().with_block(Block::user("hi")))
            .await
            .unwrap();

        assert_eq!(turn.blocks[0].text(), Some("hi"));
        assert_eq!(turn.blocks[1].text(), Some("HELLO"));
        assert_eq!(
            turn.blocks[1].metadata.get(&keys::MIDDLEWARE).unwrap().as_deref(),
            Some("uppercase")
        );
    }

    #[tokio::test]
    async fn test_errors_propagate_unwrapped() {
        let engine = FnEngine::new("failing", |_turn: Turn| {
            Err(CoreError::provider(
                crate::error::ProviderErrorKind::Auth,
                "bad key",
            ))
        })
        .with_middleware(LoggingMiddleware)
        .with_middleware(TextTransformMiddleware::uppercase());

        let err = engine
            .run_inference(&InferenceContext::new(), Turn::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ProviderAuth);
    }
}
